//! Slack request signature verification.
//!
//! # Responsibilities
//! - Reject stale requests using `X-Slack-Request-Timestamp`
//! - Decode `X-Slack-Signature` (`v0=<hex>`)
//! - Buffer the body once, HMAC-SHA256 it with the signing secret and compare
//! - Hand the buffered body downstream so the forwarder sees every byte
//!
//! # Design Decisions
//! - Checks run in a fixed order, each with its own failure status
//! - Digest comparison is constant-time (`Mac::verify_slice`)
//! - Stateless: no nonce cache, so replays inside the freshness window pass
//! - Freshness boundary is exclusive: `timestamp + max_age == now` is still fresh

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::http::response::Rejection;
use crate::security::limits::BodyTooLarge;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "v0";
pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";

/// Signing secret and freshness window.
#[derive(Clone)]
pub struct SignatureContext {
    secret: Vec<u8>,
    max_age: Duration,
}

impl SignatureContext {
    pub fn new(secret: impl Into<Vec<u8>>, max_age: Duration) -> Self {
        Self {
            secret: secret.into(),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl std::fmt::Debug for SignatureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureContext")
            .field("secret", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

/// Header material extracted before the body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub expected: Vec<u8>,
}

/// Everything the HMAC covers, built once per request and then dropped.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    pub timestamp: String,
    pub expected: Vec<u8>,
    pub body: Bytes,
}

impl SignedHeaders {
    pub fn with_body(self, body: Bytes) -> SignedEnvelope {
        SignedEnvelope {
            timestamp: self.timestamp,
            expected: self.expected,
            body,
        }
    }
}

/// Verifies signed webhook requests.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    context: SignatureContext,
    body_read_timeout: Duration,
}

impl SignatureVerifier {
    pub fn new(context: SignatureContext, body_read_timeout: Duration) -> Self {
        Self {
            context,
            body_read_timeout,
        }
    }

    /// Steps 1-3: timestamp parse, freshness, signature decode.
    pub fn inspect_headers(
        &self,
        headers: &HeaderMap,
        now: SystemTime,
    ) -> Result<SignedHeaders, Rejection> {
        let timestamp = header_str(headers, TIMESTAMP_HEADER);
        let seconds: i64 = timestamp.parse().map_err(|_| Rejection::BadTimestamp)?;

        check_freshness(seconds, self.context.max_age, now)?;

        let signature = header_str(headers, SIGNATURE_HEADER);
        let encoded = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .unwrap_or(signature);
        let expected = hex::decode(encoded).map_err(|_| Rejection::BadSignature)?;

        Ok(SignedHeaders {
            timestamp: timestamp.to_string(),
            expected,
        })
    }

    /// Step 4: the one full read of the body for the whole chain.
    pub async fn read_body(&self, body: Body) -> Result<Bytes, Rejection> {
        match tokio::time::timeout(self.body_read_timeout, axum::body::to_bytes(body, usize::MAX))
            .await
        {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) if BodyTooLarge::is_cause_of(&e) => Err(Rejection::PayloadTooLarge),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Failed to read request body");
                Err(Rejection::UnreadableBody)
            }
            Err(_) => {
                tracing::debug!(timeout = ?self.body_read_timeout, "Timed out reading request body");
                Err(Rejection::UnreadableBody)
            }
        }
    }

    /// Step 5: HMAC over `v0:<timestamp>:<body>` compared in constant time.
    pub fn verify(&self, envelope: &SignedEnvelope) -> Result<(), Rejection> {
        signing_mac(&self.context.secret, &envelope.timestamp, &envelope.body)
            .map_err(|_| Rejection::VerificationFailed)?
            .verify_slice(&envelope.expected)
            .map_err(|_| Rejection::VerificationFailed)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn signing_mac(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

/// Computes the `v0=<hex>` signature header value for a request.
pub fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let digest = signing_mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("{}={}", SIGNATURE_VERSION, hex::encode(digest)))
}

/// Rejects when `timestamp + max_age < now`. An expiry instant that cannot be
/// represented counts as expired.
pub fn check_freshness(timestamp: i64, max_age: Duration, now: SystemTime) -> Result<(), Rejection> {
    let offset = Duration::from_secs(timestamp.unsigned_abs());
    let issued = if timestamp >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };

    match issued.and_then(|t| t.checked_add(max_age)) {
        Some(expires) if expires >= now => Ok(()),
        _ => Err(Rejection::TimestampExpired),
    }
}

pub async fn verify_signature(
    State(verifier): State<Arc<SignatureVerifier>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let headers = match verifier.inspect_headers(&parts.headers, SystemTime::now()) {
        Ok(headers) => headers,
        Err(rejection) => {
            tracing::warn!(reason = %rejection, "Rejected unsigned or stale request");
            return rejection.into_response();
        }
    };

    let body = match verifier.read_body(body).await {
        Ok(body) => body,
        Err(rejection) => {
            if rejection == Rejection::PayloadTooLarge {
                tracing::debug!("Body over size limit");
            } else {
                tracing::warn!(reason = %rejection, "Rejected request with unreadable body");
            }
            return rejection.into_response();
        }
    };

    let envelope = headers.with_body(body);
    if let Err(rejection) = verifier.verify(&envelope) {
        tracing::warn!(timestamp = %envelope.timestamp, "Signature verification failed");
        return rejection.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(envelope.body)))
        .await
}
