//! Per-invocation request context handed to the handler

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::activity::{ActivityGuard, ActivityTracker};

/// Everything a handler learns about the request besides its payload.
///
/// Built by the server for exactly one invocation and dropped when that
/// invocation ends. There are no setters: the `with_*` constructors consume
/// the value, so a context is never changed once a handler holds it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Caller-supplied conversation id, never empty
    session_id: String,
    /// Id of this invocation, taken from the runtime or generated (UUIDv7)
    request_id: String,
    /// Incoming headers, lower-cased names, multi-values joined with ", "
    headers: HashMap<String, String>,
    /// Opaque workload credential relayed from the runtime
    workload_access_token: Option<String>,
    /// Fires when the client goes away before the invocation finishes
    cancellation: CancellationToken,
    /// Shared tracker behind `/ping`'s busy status
    activity: ActivityTracker,
}

impl RequestContext {
    /// Create a context for `session_id` with a fresh request id, no headers
    /// and no workload token
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            request_id: Uuid::now_v7().to_string(),
            headers: HashMap::new(),
            workload_access_token: None,
            cancellation: CancellationToken::new(),
            activity: ActivityTracker::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_workload_access_token(mut self, token: impl Into<String>) -> Self {
        self.workload_access_token = Some(token.into());
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_activity_tracker(mut self, activity: ActivityTracker) -> Self {
        self.activity = activity;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a header by name, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn workload_access_token(&self) -> Option<&str> {
        self.workload_access_token.as_deref()
    }

    /// Token cancelled when the client disconnects.
    ///
    /// Long-running handlers and producers should `select!` on
    /// [`CancellationToken::cancelled`] around expensive work so nothing runs
    /// to completion after the caller has stopped listening.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Mark background work so `/ping` reports `HealthyBusy` until the
    /// returned guard is dropped
    pub fn track_activity(&self, name: impl Into<String>) -> ActivityGuard {
        self.activity.begin(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = RequestContext::new("session-1");
        assert_eq!(ctx.session_id(), "session-1");
        assert!(!ctx.request_id().is_empty());
        assert!(ctx.headers().is_empty());
        assert!(ctx.workload_access_token().is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::new("s");
        let b = RequestContext::new("s");
        assert_ne!(a.request_id(), b.request_id());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut headers = HashMap::new();
        headers.insert("x-tenant".to_string(), "acme".to_string());
        let ctx = RequestContext::new("s").with_headers(headers);
        assert_eq!(ctx.header("X-Tenant"), Some("acme"));
        assert_eq!(ctx.header("x-missing"), None);
    }

    #[test]
    fn test_cancellation_is_shared_with_clones() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new("s").with_cancellation(token.clone());
        let copy = ctx.clone();
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(copy.is_cancelled());
    }

    #[test]
    fn test_track_activity_uses_shared_tracker() {
        let tracker = ActivityTracker::new();
        let ctx = RequestContext::new("s").with_activity_tracker(tracker.clone());
        let guard = ctx.track_activity("summarize");
        assert!(tracker.is_busy());
        drop(guard);
        assert!(!tracker.is_busy());
    }
}
