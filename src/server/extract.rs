//! Request context extraction
//!
//! Pure functions of the incoming headers and body bytes. Nothing here
//! touches the handler: a request that fails extraction never reaches it.

use std::collections::HashMap;

use axum::http::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::InvocationError;
use crate::handler::{ActivityTracker, RequestContext};

/// Header carrying the caller's session id (matched case-insensitively)
pub const SESSION_HEADER: &str = "x-amzn-bedrock-agentcore-runtime-session-id";

/// Header carrying the runtime-assigned request id
pub const REQUEST_ID_HEADER: &str = "x-amzn-bedrock-agentcore-runtime-request-id";

/// Header carrying the workload access token, relayed verbatim
pub const ACCESS_TOKEN_HEADER: &str = "workloadaccesstoken";

/// Body field consulted only when the session header is absent
pub const BODY_SESSION_FIELD: &str = "sessionId";

/// Parse the request body as JSON
pub fn parse_body(bytes: &[u8]) -> Result<Value, InvocationError> {
    serde_json::from_slice(bytes).map_err(|e| InvocationError::MalformedBody(e.to_string()))
}

/// Flatten headers to one string per lower-cased name.
///
/// Repeated headers are joined with `", "` in arrival order. Values that are
/// not valid UTF-8 are decoded lossily.
pub fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_ascii_lowercase(), joined)
        })
        .collect()
}

/// Resolve the session id: header first, then the body's `sessionId`
pub fn session_id(headers: &HeaderMap, body: &Value) -> Result<String, InvocationError> {
    let from_header = headers
        .get(SESSION_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .filter(|value| !value.trim().is_empty());

    if let Some(id) = from_header {
        return Ok(id);
    }

    body.get(BODY_SESSION_FIELD)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .ok_or(InvocationError::MissingSessionId)
}

/// Build the context for one invocation
pub fn extract_context(
    headers: &HeaderMap,
    body: &Value,
    activity: &ActivityTracker,
    cancellation: CancellationToken,
) -> Result<RequestContext, InvocationError> {
    let session_id = session_id(headers, body)?;
    let flat = flatten_headers(headers);

    let mut context = RequestContext::new(session_id)
        .with_cancellation(cancellation)
        .with_activity_tracker(activity.clone());

    if let Some(request_id) = flat.get(REQUEST_ID_HEADER).filter(|v| !v.is_empty()) {
        context = context.with_request_id(request_id.clone());
    }
    if let Some(token) = flat.get(ACCESS_TOKEN_HEADER) {
        context = context.with_workload_access_token(token.clone());
    }

    Ok(context.with_headers(flat))
}
