//! Command line and environment overlay.
//!
//! Every flag has an environment variable. Values given here win over the
//! config file, which wins over the built-in defaults.
//!
//! Durations take a unit (`30s`, `2m`, `1h30m`) or a bare number of seconds.
//! Sizes take a binary unit (`512k`, `4m`, `4MiB`) or a bare number of bytes.

use clap::Parser;
use std::path::PathBuf;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::{GatewayConfig, LogFormat, TlsConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Slack signature verifying reverse proxy.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "slack-gate", version, about)]
pub struct CliArgs {
    /// TOML configuration file.
    #[arg(long, env = "SLACK_GATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Upstream URL admitted requests are forwarded to.
    #[arg(long, env = "PROXY_HOST")]
    pub proxy_host: Option<String>,

    /// Slack signing secret.
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    pub slack_token: Option<String>,

    /// Maximum request age.
    #[arg(long, env = "SLACK_EXPIRE", value_parser = parse_secs)]
    pub slack_expire: Option<u64>,

    /// Allowed request methods.
    #[arg(long = "method", env = "HTTP_METHOD", value_delimiter = ',')]
    pub methods: Vec<String>,

    /// Allowed path patterns; a trailing `/` matches the subtree.
    #[arg(long = "uri", env = "HTTP_URI", value_delimiter = ',')]
    pub uris: Vec<String>,

    /// Maximum request body size, 0 for unlimited.
    #[arg(long, env = "HTTP_BODY_LIMIT", value_parser = parse_bytes)]
    pub body_limit: Option<u64>,

    /// Maximum request head size.
    #[arg(long, env = "HTTP_HEADER_LIMIT", value_parser = parse_bytes)]
    pub header_limit: Option<u64>,

    /// Listen addresses.
    #[arg(long = "listen", env = "LISTEN", value_delimiter = ',')]
    pub listen: Vec<String>,

    /// TLS certificate (PEM).
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<String>,

    /// TLS private key (PEM).
    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<String>,

    /// Plain HTTP listeners redirecting to HTTPS.
    #[arg(long = "redirect-listen", env = "REDIRECT_LISTEN", value_delimiter = ',')]
    pub redirect_listen: Vec<String>,

    /// Upstream response deadline.
    #[arg(long, env = "UPSTREAM_TIMEOUT", value_parser = parse_secs)]
    pub upstream_timeout: Option<u64>,

    /// Request head and body read deadline.
    #[arg(long, env = "HTTP_READ_TIMEOUT", value_parser = parse_secs)]
    pub read_timeout: Option<u64>,

    /// Deadline for the whole response.
    #[arg(long, env = "HTTP_WRITE_TIMEOUT", value_parser = parse_secs)]
    pub write_timeout: Option<u64>,

    /// Client connections quiet for this long are closed.
    #[arg(long, env = "HTTP_IDLE_TIMEOUT", value_parser = parse_secs)]
    pub idle_timeout: Option<u64>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

impl CliArgs {
    /// Builds the validated configuration: defaults, then file, then flags.
    pub fn resolve(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => GatewayConfig::default(),
        };
        self.apply(&mut config)?;
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Overlays the flags that were given onto `config`.
    pub fn apply(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        if let Some(target) = &self.proxy_host {
            config.upstream.target = target.clone();
        }
        if let Some(secret) = &self.slack_token {
            config.signature.signing_secret = secret.clone();
        }
        if let Some(secs) = self.slack_expire {
            config.signature.max_age_secs = secs;
        }
        if !self.methods.is_empty() {
            config.policy.allowed_methods = self.methods.clone();
        }
        if !self.uris.is_empty() {
            config.policy.allowed_paths = self.uris.clone();
        }
        if let Some(limit) = self.body_limit {
            config.policy.max_body_bytes = limit;
        }
        if let Some(limit) = self.header_limit {
            config.policy.max_header_bytes = usize::try_from(limit).unwrap_or(usize::MAX);
        }
        if !self.listen.is_empty() {
            config.listener.addresses = self.listen.clone();
        }
        if let Some(secs) = self.upstream_timeout {
            config.timeouts.upstream_secs = secs;
        }
        if let Some(secs) = self.read_timeout {
            config.timeouts.body_read_secs = secs;
        }
        if let Some(secs) = self.write_timeout {
            config.timeouts.write_secs = secs;
        }
        if let Some(secs) = self.idle_timeout {
            config.timeouts.idle_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }

        self.apply_tls(config)
    }

    fn apply_tls(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        if self.tls_cert.is_some() || self.tls_key.is_some() {
            let tls = config.listener.tls.get_or_insert_with(|| TlsConfig {
                cert_path: String::new(),
                key_path: String::new(),
                redirect_addresses: Vec::new(),
            });
            if let Some(cert) = &self.tls_cert {
                tls.cert_path = cert.clone();
            }
            if let Some(key) = &self.tls_key {
                tls.key_path = key.clone();
            }
        }

        if !self.redirect_listen.is_empty() {
            match config.listener.tls.as_mut() {
                Some(tls) => tls.redirect_addresses = self.redirect_listen.clone(),
                None => {
                    return Err(ConfigError::Validation(vec![
                        ValidationError::RedirectWithoutTls,
                    ]))
                }
            }
        }

        Ok(())
    }
}

/// Whole seconds from `30`, `30s`, `2m` or `1h30m`.
fn parse_secs(value: &str) -> Result<u64, String> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(value)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

/// Byte counts from `4194304`, `512k`, `4m`, `4MiB` or `1g`, in powers of 1024.
fn parse_bytes(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);

    let count: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size {value:?}"))?;
    let shift: u32 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        _ => return Err(format!("unknown size unit in {value:?}")),
    };
    count
        .checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size {value:?} is too large"))
}
