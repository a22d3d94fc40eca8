//! Client-visible errors on the non-streaming path

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::handler::HandlerError;
use crate::metrics::INVOCATION_ERRORS_TOTAL;

/// Why an invocation ended without a successful outcome.
///
/// Every variant renders as `{ "error": "<message>" }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// No session id in the header or the body
    MissingSessionId,
    /// Body is not valid JSON
    MalformedBody(String),
    /// The handler failed before producing an outcome
    Handler(HandlerError),
}

impl InvocationError {
    pub fn status(&self) -> StatusCode {
        match self {
            InvocationError::MissingSessionId | InvocationError::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            InvocationError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::MissingSessionId => "missing_session_id",
            InvocationError::MalformedBody(_) => "malformed_body",
            InvocationError::Handler(_) => "handler_error",
        }
    }
}

impl std::fmt::Display for InvocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationError::MissingSessionId => write!(f, "Missing session id"),
            InvocationError::MalformedBody(msg) => write!(f, "Invalid JSON body: {}", msg),
            // Handler messages pass through untouched
            InvocationError::Handler(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<HandlerError> for InvocationError {
    fn from(e: HandlerError) -> Self {
        InvocationError::Handler(e)
    }
}

impl IntoResponse for InvocationError {
    fn into_response(self) -> Response {
        INVOCATION_ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
