//! agenthost demo binary: an echo agent behind the invocation protocol
//!
//! ```text
//! curl -s localhost:8080/ping
//! curl -s localhost:8080/invocations \
//!   -H 'X-Amzn-Bedrock-AgentCore-Runtime-Session-Id: demo' \
//!   -d '{"prompt": "hello there", "stream": true}'
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use agenthost::{
    handler_fn, metrics, telemetry, HandlerError, InvocationOutcome, InvocationServer,
    RequestContext, ServerConfig,
};

/// Delay between streamed words, so the stream is observable by hand
const WORD_DELAY: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ServerConfig::from_env()?;
    telemetry::init_tracing("agenthost", &config.logging)?;

    if let Some(addr) = config.metrics_addr {
        tokio::spawn(serve_metrics(addr));
    }

    let server = InvocationServer::new(handler_fn(echo), config);
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    telemetry::shutdown_tracing();
    result?;
    Ok(())
}

/// Reply with the payload, or stream the words of `prompt` when
/// `"stream": true`
async fn echo(payload: Value, ctx: RequestContext) -> Result<InvocationOutcome, HandlerError> {
    if payload["stream"].as_bool() != Some(true) {
        return InvocationOutcome::single(json!({
            "session_id": ctx.session_id(),
            "request_id": ctx.request_id(),
            "echo": payload,
        }));
    }

    let prompt = payload["prompt"]
        .as_str()
        .ok_or_else(|| HandlerError::new("streaming echo needs a string \"prompt\""))?
        .to_string();
    let cancellation = ctx.cancellation().clone();

    let words = async_stream::stream! {
        for (index, word) in prompt.split_whitespace().enumerate() {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = tokio::time::sleep(WORD_DELAY) => {}
            }
            yield Ok::<_, HandlerError>(json!({ "index": index, "token": word }));
        }
    };

    Ok(InvocationOutcome::stream(words))
}

async fn serve_metrics(addr: SocketAddr) {
    let app = Router::new().route(
        "/metrics",
        get(|| async {
            metrics::encode_text().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }),
    );

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!(%addr, "Metrics listener started");
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Metrics listener stopped");
            }
        }
        Err(e) => tracing::error!(%addr, error = %e, "Failed to bind metrics listener"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
