#![allow(dead_code)]

use std::time::Duration;

use agenthost::server::SESSION_HEADER;
use agenthost::{InvocationHandler, InvocationServer, LoggingConfig, ServerConfig};
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;

/// One parsed SSE frame: optional `event:` name and joined `data:` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: Option<String>,
    pub data: String,
}

impl Frame {
    pub fn data(data: &str) -> Self {
        Self {
            event: None,
            data: data.to_string(),
        }
    }

    pub fn named(event: &str, data: &str) -> Self {
        Self {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }
}

pub fn quiet_config() -> ServerConfig {
    ServerConfig::default().with_logging(LoggingConfig {
        enabled: false,
        ..LoggingConfig::default()
    })
}

pub fn router_for<H: InvocationHandler>(handler: H) -> Router {
    InvocationServer::new(handler, quiet_config()).router()
}

pub fn invocation(session: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json");
    if let Some(session) = session {
        builder = builder.header(SESSION_HEADER, session);
    }
    builder.body(body.into()).unwrap()
}

pub fn json_invocation(session: Option<&str>, payload: &Value) -> Request<Body> {
    invocation(session, payload.to_string())
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let text = body_text(response).await;
    serde_json::from_str(&text).unwrap()
}

/// Split an SSE body into logical frames, skipping keep-alive comments
pub fn parse_frames(body: &str) -> Vec<Frame> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim_start().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
            }
            if event.is_none() && data.is_empty() {
                None
            } else {
                Some(Frame {
                    event,
                    data: data.join("\n"),
                })
            }
        })
        .collect()
}

pub const WAIT: Duration = Duration::from_secs(2);
