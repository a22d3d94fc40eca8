//! agenthost - HTTP invocation host for agent handlers
//!
//! This library hosts a user-supplied handler behind the two-route protocol
//! an orchestration runtime uses to invoke agents and poll their liveness.
//! Handler results go out either as one JSON body or as an ordered
//! Server-Sent-Events stream.
//!
//! # Modules
//!
//! - `handler` - Handler contract: context, outcomes, producers
//! - `server` - `/ping` and `/invocations`, SSE state machine, middleware
//! - `config` - Startup configuration (env-driven)
//! - `telemetry` - tracing-subscriber setup and optional OTLP export
//! - `metrics` - Prometheus metrics for observability
//!
//! # Quick Start
//!
//! ```ignore
//! use agenthost::{handler_fn, InvocationOutcome, InvocationServer, ServerConfig};
//!
//! let handler = handler_fn(|payload, ctx| async move {
//!     InvocationOutcome::single(serde_json::json!({
//!         "session": ctx.session_id(),
//!         "echo": payload,
//!     }))
//! });
//!
//! InvocationServer::new(handler, ServerConfig::default()).serve().await?;
//! ```

pub mod config;
pub mod handler;
pub mod metrics;
pub mod server;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use config::{LogLevel, LoggingConfig, ServerConfig};
pub use handler::{
    handler_fn, HandlerError, InvocationHandler, InvocationOutcome, Producer, RequestContext,
};
pub use server::{InvocationServer, Middleware};
