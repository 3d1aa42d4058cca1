//! Response deadline.
//!
//! # Responsibilities
//! - Bound the time from a request reaching the router to its response being fully sent
//!
//! # Design Decisions
//! - A response head that is not ready in time becomes 503
//! - A response body still streaming at the deadline fails with `DeadlineExceeded`,
//!   which makes the server abort the connection

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError,
};
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};

use crate::http::response::Rejection;

/// Error yielded by [`DeadlineBody`] once the deadline has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response deadline exceeded")]
pub struct DeadlineExceeded;

/// Time budget for a whole exchange.
#[derive(Debug, Clone, Copy)]
pub struct WriteDeadline {
    timeout: Duration,
}

impl WriteDeadline {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Response body that stops yielding frames at a fixed instant.
pub struct DeadlineBody {
    inner: Body,
    expires: Pin<Box<Sleep>>,
}

impl DeadlineBody {
    pub fn new(inner: Body, expires: Instant) -> Self {
        Self {
            inner,
            expires: Box::pin(tokio::time::sleep_until(expires)),
        }
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();

        if this.expires.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Some(Err(Box::new(DeadlineExceeded))));
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(frame) => Poll::Ready(frame.map(|r| r.map_err(Into::into))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

pub async fn enforce_deadline(
    State(deadline): State<Arc<WriteDeadline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let expires = Instant::now() + deadline.timeout();

    match tokio::time::timeout_at(expires, next.run(request)).await {
        Ok(response) => response.map(|body| Body::new(DeadlineBody::new(body, expires))),
        Err(_) => {
            tracing::warn!(
                timeout_secs = deadline.timeout().as_secs_f64(),
                "Response not ready before the write deadline"
            );
            Rejection::WriteTimeout.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::any, Router};
    use futures_util::{stream, StreamExt};
    use tower::ServiceExt;

    fn bounded(timeout: Duration, terminal: Router) -> Router {
        terminal.layer(middleware::from_fn_with_state(
            Arc::new(WriteDeadline::new(timeout)),
            enforce_deadline,
        ))
    }

    fn get() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn quick_response_passes_intact() {
        let router = bounded(
            Duration::from_secs(5),
            Router::new().route("/", any(|| async { "on time" })),
        );

        let response = router.oneshot(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"on time");
    }

    #[tokio::test]
    async fn late_response_head_is_unavailable() {
        let router = bounded(
            Duration::from_millis(100),
            Router::new().route(
                "/",
                any(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "too late"
                }),
            ),
        );

        let response = router.oneshot(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"response deadline exceeded\n");
    }

    #[tokio::test]
    async fn stalled_response_body_is_cut_off() {
        let router = bounded(
            Duration::from_millis(200),
            Router::new().route(
                "/",
                any(|| async {
                    let chunks = stream::once(async {
                        Ok::<_, std::io::Error>(Bytes::from_static(b"partial"))
                    })
                    .chain(stream::pending());
                    Body::from_stream(chunks)
                }),
            ),
        );

        let response = router.oneshot(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let drained = tokio::time::timeout(
            Duration::from_secs(5),
            axum::body::to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .unwrap();
        assert!(drained.is_err());
    }
}
