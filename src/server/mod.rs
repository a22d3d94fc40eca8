//! Invocation server
//!
//! Hosts one [`InvocationHandler`] behind two routes:
//!
//! - `GET /ping` - liveness for the orchestration runtime
//! - `POST /invocations` - run the handler, answer with JSON or SSE
//!
//! # Quick Start
//!
//! ```ignore
//! use agenthost::config::ServerConfig;
//! use agenthost::handler::{handler_fn, InvocationOutcome};
//! use agenthost::server::InvocationServer;
//!
//! let handler = handler_fn(|payload, _ctx| async move { InvocationOutcome::single(payload) });
//! InvocationServer::new(handler, ServerConfig::from_env()?).serve().await?;
//! ```

pub mod error;
pub mod extract;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod sse;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::handler::{ActivityTracker, InvocationHandler};

pub use error::InvocationError;
pub use extract::{ACCESS_TOKEN_HEADER, REQUEST_ID_HEADER, SESSION_HEADER};
pub use health::{HealthStatus, PingStatus};
pub use middleware::{Middleware, RequestLog};
pub use routes::{AppState, INVOCATIONS_PATH, PING_PATH};
pub use sse::{StreamEvent, StreamState};

/// HTTP server owning the handler and its configuration for its lifetime
pub struct InvocationServer {
    config: ServerConfig,
    state: AppState,
}

impl InvocationServer {
    pub fn new<H: InvocationHandler>(handler: H, config: ServerConfig) -> Self {
        Self::with_shared_handler(Arc::new(handler), config)
    }

    pub fn with_shared_handler(handler: Arc<dyn InvocationHandler>, config: ServerConfig) -> Self {
        let state = AppState {
            handler,
            activity: ActivityTracker::new(),
            keep_alive: config.keep_alive_interval,
        };
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Tracker behind `/ping`'s busy status
    pub fn activity(&self) -> ActivityTracker {
        self.state.activity.clone()
    }

    /// Build the router with the configured middleware applied.
    ///
    /// The access log, when logging is enabled, wraps every user middleware.
    pub fn router(&self) -> Router {
        let mut layers: Vec<Arc<dyn Middleware>> = Vec::new();
        if self.config.logging.enabled {
            layers.push(Arc::new(RequestLog));
        }
        layers.extend(self.config.middleware.iter().cloned());

        middleware::apply(routes::routes().with_state(self.state.clone()), &layers)
    }

    /// Bind `config.bind_addr` and serve until the process exits
    pub async fn serve(self) -> std::io::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Bind `config.bind_addr` and serve until `shutdown` resolves
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "Invocation server listening");

        let router = self.router();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
