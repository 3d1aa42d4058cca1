//! Request body size limits.
//!
//! # Responsibilities
//! - Reject requests whose declared `Content-Length` exceeds the ceiling
//! - Count the bytes actually streamed and fail the stream once they exceed it
//!
//! # Design Decisions
//! - Declared length is checked before any byte is read
//! - Chunked or under-reported bodies are caught by the counting wrapper
//! - Overflow surfaces as a typed stream error (`BodyTooLarge`), never as truncation;
//!   whoever drains the body maps it to 413 before any response is written

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError,
};
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use crate::http::response::Rejection;

/// Error yielded by [`LimitedBody`] when the byte budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request body exceeds {limit} bytes")]
pub struct BodyTooLarge {
    pub limit: u64,
}

impl BodyTooLarge {
    /// Walks an error's source chain looking for a body overflow.
    pub fn is_cause_of(err: &(dyn StdError + 'static)) -> bool {
        let mut cursor: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = cursor {
            if e.is::<BodyTooLarge>() {
                return true;
            }
            cursor = e.source();
        }
        false
    }
}

/// Body wrapper that enforces a byte budget on every frame it yields.
pub struct LimitedBody {
    inner: Body,
    limit: u64,
    remaining: u64,
}

impl LimitedBody {
    pub fn new(inner: Body, limit: u64) -> Self {
        Self {
            inner,
            limit,
            remaining: limit,
        }
    }
}

impl HttpBody for LimitedBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();

        let frame = match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
            None => return Poll::Ready(None),
        };

        if let Some(data) = frame.data_ref() {
            let len = data.len() as u64;
            if len > this.remaining {
                this.remaining = 0;
                return Poll::Ready(Some(Err(Box::new(BodyTooLarge { limit: this.limit }))));
            }
            this.remaining -= len;
        }

        Poll::Ready(Some(Ok(frame)))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let inner = self.inner.size_hint();
        let mut hint = SizeHint::new();
        hint.set_lower(inner.lower().min(self.remaining));
        if let Some(upper) = inner.upper() {
            hint.set_upper(upper.min(self.remaining));
        }
        hint
    }
}

/// Enforces a maximum request body size.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimiter {
    max_bytes: u64,
}

impl BodyLimiter {
    /// Returns `None` for a zero ceiling: no ceiling means no limiter.
    pub fn new(max_bytes: u64) -> Option<Self> {
        (max_bytes > 0).then_some(Self { max_bytes })
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Cheap pre-check against the declared length.
    pub fn declared_within_limit(&self, headers: &HeaderMap) -> bool {
        match declared_length(headers) {
            Some(len) => len <= self.max_bytes,
            None => true,
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

pub async fn limit_body(
    State(limiter): State<Arc<BodyLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.declared_within_limit(request.headers()) {
        tracing::debug!(
            limit = limiter.max_bytes(),
            content_length = ?declared_length(request.headers()),
            "Declared body over size limit"
        );
        return Rejection::PayloadTooLarge.into_response();
    }

    let max_bytes = limiter.max_bytes();
    let request = request.map(|body| Body::new(LimitedBody::new(body, max_bytes)));
    next.run(request).await
}
