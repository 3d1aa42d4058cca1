//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that listen addresses and the upstream URL parse
//! - Validate value ranges (timeouts > 0, header limit above the server minimum)
//! - Detect contradictory TLS settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;
use crate::http::forward::UpstreamTarget;
use crate::http::server::MIN_HEADER_BYTES;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("signature.signing_secret must not be empty")]
    MissingSecret,

    #[error("listener.addresses must contain at least one address")]
    NoListeners,

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("invalid upstream target {target:?}: {reason}")]
    InvalidUpstream { target: String, reason: String },

    #[error("policy.allowed_methods contains an empty method")]
    EmptyMethod,

    #[error("policy.allowed_paths contains an empty pattern")]
    EmptyPathPattern,

    #[error("listener.tls.{0} must not be empty")]
    IncompleteTls(&'static str),

    #[error("redirect listeners require TLS")]
    RedirectWithoutTls,

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("policy.max_header_bytes must be at least {min}, got {actual}")]
    HeaderLimitTooSmall { min: usize, actual: usize },
}

/// Checks a configuration for semantic problems.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.signature.signing_secret.is_empty() {
        errors.push(ValidationError::MissingSecret);
    }

    if config.listener.addresses.is_empty() {
        errors.push(ValidationError::NoListeners);
    }
    check_addresses(&config.listener.addresses, &mut errors);

    if let Err(e) = UpstreamTarget::parse(&config.upstream.target) {
        errors.push(ValidationError::InvalidUpstream {
            target: config.upstream.target.clone(),
            reason: e.to_string(),
        });
    }

    if config.policy.allowed_methods.iter().any(|m| m.trim().is_empty()) {
        errors.push(ValidationError::EmptyMethod);
    }
    if config.policy.allowed_paths.iter().any(|p| p.trim().is_empty()) {
        errors.push(ValidationError::EmptyPathPattern);
    }

    if config.policy.max_header_bytes < MIN_HEADER_BYTES {
        errors.push(ValidationError::HeaderLimitTooSmall {
            min: MIN_HEADER_BYTES,
            actual: config.policy.max_header_bytes,
        });
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::IncompleteTls("cert_path"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::IncompleteTls("key_path"));
        }
        check_addresses(&tls.redirect_addresses, &mut errors);
    }

    let timeouts = [
        ("connect_secs", config.timeouts.connect_secs),
        ("upstream_secs", config.timeouts.upstream_secs),
        ("body_read_secs", config.timeouts.body_read_secs),
        ("write_secs", config.timeouts.write_secs),
        ("idle_secs", config.timeouts.idle_secs),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addresses(addresses: &[String], errors: &mut Vec<ValidationError>) {
    for address in addresses {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress(address.clone()));
        }
    }
}
