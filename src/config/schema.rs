//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind addresses, TLS).
    pub listener: ListenerConfig,

    /// The single upstream admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Request signature verification.
    pub signature: SignatureConfig,

    /// Method, path, header and body size policy.
    pub policy: PolicyConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind addresses (e.g., "0.0.0.0:8080"). Every entry is served.
    pub addresses: Vec<String>,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

/// TLS configuration for the listeners.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Plain HTTP listeners that redirect to HTTPS.
    #[serde(default)]
    pub redirect_addresses: Vec<String>,
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Absolute `http://` URL, optionally with a base path and query.
    pub target: String,
}

/// Signature verification settings.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SignatureConfig {
    /// Shared signing secret.
    pub signing_secret: String,

    /// Maximum accepted request age in seconds.
    pub max_age_secs: u64,
}

impl SignatureConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
            max_age_secs: 30,
        }
    }
}

impl fmt::Debug for SignatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureConfig")
            .field("signing_secret", &"<redacted>")
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

/// Admission policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Accepted request methods. Empty disables the method gate.
    pub allowed_methods: Vec<String>,

    /// Accepted path patterns. A trailing `/` matches the whole subtree.
    /// Empty disables the path gate.
    pub allowed_paths: Vec<String>,

    /// Maximum request body size in bytes. Zero disables the limit.
    pub max_body_bytes: u64,

    /// Maximum size of a request head (request line plus headers) in bytes.
    pub max_header_bytes: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_methods: vec!["POST".to_string()],
            allowed_paths: Vec::new(),
            max_body_bytes: 4 * 1024 * 1024,
            max_header_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connect timeout in seconds.
    pub connect_secs: u64,

    /// Upstream response deadline in seconds.
    pub upstream_secs: u64,

    /// Deadline for reading a request head, and separately its body, in seconds.
    pub body_read_secs: u64,

    /// Deadline for producing the whole response, counted from the end of the
    /// request head, in seconds.
    pub write_secs: u64,

    /// Client connections without traffic for this many seconds are closed.
    pub idle_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }

    pub fn body_read(&self) -> Duration {
        Duration::from_secs(self.body_read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            body_read_secs: 10,
            write_secs: 10,
            idle_secs: 120,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.signature.max_age_secs, 30);
        assert_eq!(config.policy.allowed_methods, vec!["POST"]);
        assert!(config.policy.allowed_paths.is_empty());
        assert_eq!(config.policy.max_body_bytes, 4 * 1024 * 1024);
        assert_eq!(config.policy.max_header_bytes, 4 * 1024 * 1024);
        assert_eq!(config.timeouts.upstream(), Duration::from_secs(30));
        assert_eq!(config.timeouts.write(), Duration::from_secs(10));
        assert_eq!(config.timeouts.idle(), Duration::from_secs(120));
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert!(config.listener.tls.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [upstream]
            target = "http://127.0.0.1:3000"

            [signature]
            signing_secret = "s3cr3t"

            [listener]
            addresses = ["0.0.0.0:8080"]

            [listener.tls]
            cert_path = "cert.pem"
            key_path = "key.pem"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.target, "http://127.0.0.1:3000");
        assert_eq!(config.signature.max_age_secs, 30);
        assert_eq!(config.policy.allowed_methods, vec!["POST"]);
        let tls = config.listener.tls.unwrap();
        assert!(tls.redirect_addresses.is_empty());
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn debug_output_redacts_secret() {
        let signature = SignatureConfig {
            signing_secret: "hunter2".to_string(),
            max_age_secs: 30,
        };
        let printed = format!("{:?}", signature);
        assert!(!printed.contains("hunter2"));
    }
}
