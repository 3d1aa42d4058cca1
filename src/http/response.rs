//! Response handling for rejected requests.
//!
//! # Responsibilities
//! - Map every admission failure to exactly one status code
//! - Render a short plain-text error page
//!
//! # Design Decisions
//! - Messages are static: no internal detail, header values or secrets are echoed
//! - Body is the message plus a trailing newline, served as `text/plain`

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::security::signature::TIMESTAMP_HEADER;

/// Terminal outcome of a gate that refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("uri not found")]
    PathNotAllowed,

    #[error("body over size limit")]
    PayloadTooLarge,

    #[error("bad timestamp in {}", TIMESTAMP_HEADER)]
    BadTimestamp,

    #[error("timestamp expired")]
    TimestampExpired,

    #[error("bad signature")]
    BadSignature,

    #[error("bad request")]
    UnreadableBody,

    #[error("verification failed")]
    VerificationFailed,

    #[error("missing host header")]
    MissingHost,

    #[error("upstream unavailable")]
    UpstreamUnavailable,

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("response deadline exceeded")]
    WriteTimeout,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Rejection::PathNotAllowed => StatusCode::NOT_FOUND,
            Rejection::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::BadTimestamp
            | Rejection::BadSignature
            | Rejection::UnreadableBody
            | Rejection::MissingHost => StatusCode::BAD_REQUEST,
            Rejection::TimestampExpired | Rejection::VerificationFailed => {
                StatusCode::UNAUTHORIZED
            }
            Rejection::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            Rejection::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Rejection::WriteTimeout => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(format!("{}\n", self)));
        *response.status_mut() = self.status();

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        response
    }
}
