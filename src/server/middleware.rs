//! Request hooks wrapped around the route table
//!
//! Middleware is an ordered list fixed at construction. The first entry is
//! the outermost layer: it sees the request first and the response last.
//!
//! ```text
//! request ──► mw[0] ──► mw[1] ──► ... ──► /ping | /invocations
//! response ◄── mw[0] ◄── mw[1] ◄── ... ◄──┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::Request;
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::Router;

/// A hook that can inspect or rewrite a request, short-circuit it, or
/// post-process the response
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, request: Request, next: Next) -> Response;
}

/// Access log line per request, installed when logging is enabled
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLog;

#[async_trait]
impl Middleware for RequestLog {
    async fn handle(&self, request: Request, next: Next) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let start = Instant::now();

        let response = next.run(request).await;

        // For SSE this is time to first byte, not stream duration
        tracing::info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Request handled"
        );
        response
    }
}

/// Wrap `router` so that `middleware[0]` runs outermost
pub(crate) fn apply(router: Router, middleware: &[Arc<dyn Middleware>]) -> Router {
    middleware.iter().rev().fold(router, |router, mw| {
        let mw = Arc::clone(mw);
        router.layer(from_fn(move |request: Request, next: Next| {
            let mw = Arc::clone(&mw);
            async move { mw.handle(request, next).await }
        }))
    })
}
