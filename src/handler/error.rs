//! Errors raised by user handlers and their producers

/// Failure reported by a handler, either before it returns an outcome or
/// while a streaming producer is being pulled.
///
/// Only the message crosses the wire, so a handler error never leaks more
/// than `Display` of whatever caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create an error with a human-readable message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message sent to the client
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::new(format!("Failed to serialize result: {}", e))
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        HandlerError::new(e.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for HandlerError {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        HandlerError::new(e.to_string())
    }
}

/// Convert a caught panic payload into a handler error.
///
/// `panic!` with a literal carries `&'static str`, with a format string it
/// carries `String`. Anything else gets a generic message.
pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> HandlerError {
    let detail = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    HandlerError::new(format!("Handler panicked: {}", detail))
}
