//! Route handlers for `/ping` and `/invocations`
//!
//! # Invocation Flow
//!
//! ```text
//! POST /invocations
//!   │
//!   ├─ parse body ───────── invalid JSON ──────────► 400 {"error"}
//!   ├─ extract context ──── no session id ─────────► 400 {"error"}
//!   ├─ handler.invoke ───── Err / panic ───────────► 500 {"error"}
//!   │
//!   └─ match outcome
//!        ├─ Single(v) ─────────────────────────────► 200 application/json
//!        └─ Stream(p) ──► sse::stream_response ────► 200 text/event-stream
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::error::InvocationError;
use super::extract::{extract_context, parse_body};
use super::health::HealthStatus;
use super::sse::stream_response;
use crate::handler::error::from_panic;
use crate::handler::{ActivityTracker, InvocationHandler, InvocationOutcome, RequestContext};
use crate::metrics::{INVOCATIONS_TOTAL, INVOCATION_DURATION, PINGS_TOTAL};

/// Health check path
pub const PING_PATH: &str = "/ping";
/// Invocation path
pub const INVOCATIONS_PATH: &str = "/invocations";

/// Read-only state shared by every request
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn InvocationHandler>,
    pub activity: ActivityTracker,
    pub keep_alive: Duration,
}

/// The fixed route table
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(PING_PATH, get(ping))
        .route(INVOCATIONS_PATH, post(invoke))
}

async fn ping(State(state): State<AppState>) -> Json<HealthStatus> {
    let health = HealthStatus::current(&state.activity);
    PINGS_TOTAL.with_label_values(&[health.status.as_str()]).inc();
    Json(health)
}

async fn invoke(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let started = Instant::now();

    let payload = match parse_body(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejected invocation");
            return e.into_response();
        }
    };

    let cancellation = CancellationToken::new();
    let context = match extract_context(
        &headers,
        &payload,
        &state.activity,
        cancellation.clone(),
    ) {
        Ok(context) => context,
        Err(e) => {
            warn!(error = %e, "Rejected invocation");
            return e.into_response();
        }
    };

    let span = info_span!(
        "invocation",
        session_id = %context.session_id(),
        request_id = %context.request_id(),
    );

    dispatch(state, payload, context, cancellation, started)
        .instrument(span)
        .await
}

async fn dispatch(
    state: AppState,
    payload: Value,
    context: RequestContext,
    cancellation: CancellationToken,
    started: Instant,
) -> Response {
    // Dropped with this future if the connection closes mid-handler
    let guard = cancellation.clone().drop_guard();
    let result = AssertUnwindSafe(state.handler.invoke(payload, context))
        .catch_unwind()
        .await;
    let _ = guard.disarm();

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(error = %e, "Handler failed");
            return InvocationError::Handler(e).into_response();
        }
        Err(panic) => {
            let e = from_panic(panic);
            warn!(error = %e, "Handler panicked");
            return InvocationError::Handler(e).into_response();
        }
    };

    let kind = if outcome.is_stream() { "stream" } else { "single" };
    INVOCATIONS_TOTAL.with_label_values(&[kind]).inc();

    match outcome {
        InvocationOutcome::Single(value) => {
            INVOCATION_DURATION
                .with_label_values(&["single"])
                .observe(started.elapsed().as_secs_f64());
            info!(outcome = "single", "Invocation complete");
            (StatusCode::OK, Json(value)).into_response()
        }
        InvocationOutcome::Stream(producer) => {
            info!(outcome = "stream", "Invocation streaming");
            stream_response(producer, cancellation, state.keep_alive, started)
        }
    }
}
