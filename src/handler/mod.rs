//! Handler contract between user agent logic and the invocation server
//!
//! A handler receives the parsed JSON payload and a [`RequestContext`] and
//! returns an [`InvocationOutcome`]. The server never looks inside payloads
//! or results beyond serializing them.
//!
//! # Example
//!
//! ```ignore
//! use agenthost::handler::{handler_fn, InvocationOutcome};
//!
//! let handler = handler_fn(|payload, ctx| async move {
//!     if payload["stream"].as_bool() == Some(true) {
//!         Ok(InvocationOutcome::iter(vec!["thinking", "done"]))
//!     } else {
//!         InvocationOutcome::single(serde_json::json!({ "session": ctx.session_id() }))
//!     }
//! });
//! ```

pub mod activity;
pub mod context;
pub mod error;
pub mod outcome;

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

pub use activity::{ActivityGuard, ActivityTracker};
pub use context::RequestContext;
pub use error::HandlerError;
pub use outcome::{InvocationOutcome, IterProducer, Producer, StreamProducer};

/// User-supplied agent logic behind `POST /invocations`
#[async_trait]
pub trait InvocationHandler: Send + Sync + 'static {
    async fn invoke(
        &self,
        payload: Value,
        context: RequestContext,
    ) -> Result<InvocationOutcome, HandlerError>;
}

/// Adapter turning an async closure into an [`InvocationHandler`]
pub struct HandlerFn<F> {
    f: F,
}

/// Build a handler from `Fn(Value, RequestContext) -> impl Future<...>`
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvocationOutcome, HandlerError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> InvocationHandler for HandlerFn<F>
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvocationOutcome, HandlerError>> + Send + 'static,
{
    async fn invoke(
        &self,
        payload: Value,
        context: RequestContext,
    ) -> Result<InvocationOutcome, HandlerError> {
        (self.f)(payload, context).await
    }
}
