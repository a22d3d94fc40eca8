//! SSE streaming state machine
//!
//! A streaming invocation is split into two halves joined by a channel of
//! capacity one:
//!
//! ```text
//!  ┌──────────── pump task ────────────┐          ┌──── response body ────┐
//!  │ producer.next() ──► StreamEvent ──┼──mpsc(1)─┼─► Sse<DisconnectGuard> │──► client
//!  └───────────────▲───────────────────┘          └───────────┬───────────┘
//!                  │                                          │ dropped by transport
//!                  └────────── CancellationToken ◄────────────┘
//! ```
//!
//! States:
//!
//! ```text
//! Idle ──► Streaming ──┬──► Done          producer exhausted, `event: done` sent
//!                      ├──► Errored       producer failed,    `event: error` sent
//!                      └──► Disconnected  body dropped, nothing sent, producer cancelled
//! ```
//!
//! The pump never holds more than one pulled value that the transport has
//! not accepted, never pulls after a terminal state, and never writes after
//! the body is gone.

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::http::{header, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{FutureExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn, Instrument};

use crate::handler::error::from_panic;
use crate::handler::Producer;
use crate::metrics::{INVOCATION_DURATION, STREAM_EVENTS_TOTAL, STREAMS_IN_FLIGHT};

/// One logical event of a streaming invocation
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// `data: <json>`
    Data(Value),
    /// `event: error` / `data: {"error": ...}`
    Error(String),
    /// `event: done` / `data: {}`
    Done,
}

impl StreamEvent {
    pub fn label(&self) -> &'static str {
        match self {
            StreamEvent::Data(_) => "data",
            StreamEvent::Error(_) => "error",
            StreamEvent::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Data(_))
    }

    /// Frame as an SSE event
    pub fn to_sse(&self) -> Event {
        match self {
            StreamEvent::Data(value) => Event::default().data(value.to_string()),
            StreamEvent::Error(message) => Event::default()
                .event("error")
                .data(serde_json::json!({ "error": message }).to_string()),
            StreamEvent::Done => Event::default().event("done").data("{}"),
        }
    }
}

/// Lifecycle of one streaming invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Done,
    Errored,
    Disconnected,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Done | StreamState::Errored | StreamState::Disconnected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::Streaming => "streaming",
            StreamState::Done => "done",
            StreamState::Errored => "errored",
            StreamState::Disconnected => "disconnected",
        }
    }
}

/// Pulls a producer and forwards its values as [`StreamEvent`]s
pub struct StreamPump {
    producer: Box<dyn Producer>,
    tx: mpsc::Sender<StreamEvent>,
    cancellation: CancellationToken,
    state: StreamState,
    data_sent: usize,
}

impl StreamPump {
    pub fn new(
        producer: Box<dyn Producer>,
        tx: mpsc::Sender<StreamEvent>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            producer,
            tx,
            cancellation,
            state: StreamState::Idle,
            data_sent: 0,
        }
    }

    /// Drive the stream to a terminal state and return it.
    ///
    /// The producer is cancelled on disconnect and dropped on every exit.
    pub async fn run(mut self) -> StreamState {
        self.state = StreamState::Streaming;
        STREAMS_IN_FLIGHT.inc();

        while !self.state.is_terminal() {
            self.step().await;
        }

        if self.state == StreamState::Disconnected {
            self.producer.cancel();
            self.cancellation.cancel();
            debug!(data_sent = self.data_sent, "Client disconnected, producer cancelled");
        }

        STREAMS_IN_FLIGHT.dec();
        self.state
    }

    /// One pull, one event.
    ///
    /// A channel slot is reserved before the producer is asked for a value,
    /// so nothing is produced until the body has taken the previous event.
    async fn step(&mut self) {
        let permit = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => None,
            permit = self.tx.reserve() => permit.ok(),
        };
        let Some(permit) = permit else {
            self.state = StreamState::Disconnected;
            return;
        };

        let pulled = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => None,
            _ = self.tx.closed() => None,
            item = AssertUnwindSafe(self.producer.next()).catch_unwind() => Some(item),
        };

        let Some(pulled) = pulled else {
            self.state = StreamState::Disconnected;
            return;
        };

        let event = match pulled {
            Ok(Some(Ok(value))) => StreamEvent::Data(value),
            Ok(Some(Err(e))) => {
                warn!(error = %e, "Producer failed mid-stream");
                StreamEvent::Error(e.message().to_string())
            }
            Ok(None) => StreamEvent::Done,
            Err(panic) => {
                let e = from_panic(panic);
                warn!(error = %e, "Producer panicked mid-stream");
                StreamEvent::Error(e.message().to_string())
            }
        };

        // The body may have gone while the producer was running
        if self.cancellation.is_cancelled() || self.tx.is_closed() {
            self.state = StreamState::Disconnected;
            return;
        }

        let next_state = match &event {
            StreamEvent::Data(_) => StreamState::Streaming,
            StreamEvent::Error(_) => StreamState::Errored,
            StreamEvent::Done => StreamState::Done,
        };
        let label = event.label();
        if !event.is_terminal() {
            self.data_sent += 1;
        }

        permit.send(event);
        STREAM_EVENTS_TOTAL.with_label_values(&[label]).inc();
        self.state = next_state;
    }
}

/// Response body stream that cancels the invocation when dropped.
///
/// The transport drops the body when the client goes away, which is the
/// only disconnect signal hyper gives us.
struct DisconnectGuard<S> {
    inner: S,
    _guard: DropGuard,
}

impl<S> Stream for DisconnectGuard<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Switch a response to SSE and start pumping `producer`.
///
/// The disconnect guard is armed before the pump task is spawned, so it is
/// in place before the first value is pulled.
pub fn stream_response(
    producer: Box<dyn Producer>,
    cancellation: CancellationToken,
    keep_alive: Duration,
    started: Instant,
) -> Response {
    let (tx, rx) = mpsc::channel::<StreamEvent>(1);
    let guard = cancellation.clone().drop_guard();
    let pump = StreamPump::new(producer, tx, cancellation);

    tokio::spawn(
        async move {
            let state = pump.run().await;
            INVOCATION_DURATION
                .with_label_values(&["stream"])
                .observe(started.elapsed().as_secs_f64());
            debug!(
                state = state.as_str(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Stream finished"
            );
        }
        .in_current_span(),
    );

    let events = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.to_sse()));
    let body = DisconnectGuard {
        inner: events,
        _guard: guard,
    };

    let sse = Sse::new(body).keep_alive(KeepAlive::new().interval(keep_alive));
    (
        [(header::CONNECTION, HeaderValue::from_static("keep-alive"))],
        sse,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Step {
        Yield(Value),
        Fail(&'static str),
        Panic,
        Hang,
    }

    struct ScriptedProducer {
        steps: VecDeque<Step>,
        pulls: Arc<AtomicUsize>,
        cancelled: Arc<AtomicBool>,
    }

    impl ScriptedProducer {
        fn new(steps: Vec<Step>) -> (Self, Arc<AtomicUsize>, Arc<AtomicBool>) {
            let pulls = Arc::new(AtomicUsize::new(0));
            let cancelled = Arc::new(AtomicBool::new(false));
            let producer = Self {
                steps: steps.into(),
                pulls: Arc::clone(&pulls),
                cancelled: Arc::clone(&cancelled),
            };
            (producer, pulls, cancelled)
        }
    }

    #[async_trait]
    impl Producer for ScriptedProducer {
        async fn next(&mut self) -> Option<Result<Value, HandlerError>> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            match self.steps.pop_front()? {
                Step::Yield(value) => Some(Ok(value)),
                Step::Fail(msg) => Some(Err(HandlerError::new(msg))),
                Step::Panic => panic!("producer exploded"),
                Step::Hang => {
                    futures_util::future::pending::<()>().await;
                    None
                }
            }
        }

        fn cancel(&mut self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_values_then_done() {
        let (producer, _, cancelled) = ScriptedProducer::new(vec![
            Step::Yield(json!("a")),
            Step::Yield(json!("b")),
            Step::Yield(json!("c")),
        ]);
        let (tx, rx) = mpsc::channel(1);
        let pump = StreamPump::new(Box::new(producer), tx, CancellationToken::new());

        let handle = tokio::spawn(pump.run());
        let events = collect(rx).await;

        assert_eq!(handle.await.unwrap(), StreamState::Done);
        assert_eq!(
            events,
            vec![
                StreamEvent::Data(json!("a")),
                StreamEvent::Data(json!("b")),
                StreamEvent::Data(json!("c")),
                StreamEvent::Done,
            ]
        );
        assert!(!cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_error_is_single_terminal() {
        let (producer, pulls, _) = ScriptedProducer::new(vec![
            Step::Yield(json!("a")),
            Step::Fail("tool crashed"),
            Step::Yield(json!("never")),
        ]);
        let (tx, rx) = mpsc::channel(1);
        let pump = StreamPump::new(Box::new(producer), tx, CancellationToken::new());
        let handle = tokio::spawn(pump.run());
        let events = collect(rx).await;

        assert_eq!(handle.await.unwrap(), StreamState::Errored);
        assert_eq!(
            events,
            vec![
                StreamEvent::Data(json!("a")),
                StreamEvent::Error("tool crashed".to_string()),
            ]
        );
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_error_event() {
        let (producer, _, _) = ScriptedProducer::new(vec![Step::Panic]);
        let (tx, rx) = mpsc::channel(1);
        let pump = StreamPump::new(Box::new(producer), tx, CancellationToken::new());
        let handle = tokio::spawn(pump.run());
        let events = collect(rx).await;

        assert_eq!(handle.await.unwrap(), StreamState::Errored);
        assert_eq!(
            events,
            vec![StreamEvent::Error("Handler panicked: producer exploded".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_cancels_producer() {
        let (producer, pulls, cancelled) =
            ScriptedProducer::new(vec![Step::Yield(json!("a")), Step::Hang]);
        let (tx, mut rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let handle = tokio::spawn(StreamPump::new(Box::new(producer), tx, token.clone()).run());

        assert_eq!(rx.recv().await, Some(StreamEvent::Data(json!("a"))));
        drop(rx);

        assert_eq!(handle.await.unwrap(), StreamState::Disconnected);
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(token.is_cancelled());
        assert!(pulls.load(Ordering::SeqCst) <= 2);
    }

    /// Never runs dry; counts how often it was asked
    struct CountingProducer {
        pulls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Producer for CountingProducer {
        async fn next(&mut self) -> Option<Result<Value, HandlerError>> {
            let n = self.pulls.fetch_add(1, Ordering::SeqCst);
            Some(Ok(json!(n)))
        }
    }

    #[tokio::test]
    async fn test_pulls_at_most_one_ahead_of_reader() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let producer = CountingProducer {
            pulls: Arc::clone(&pulls),
        };
        let (tx, mut rx) = mpsc::channel(1);
        let pump = StreamPump::new(Box::new(producer), tx, CancellationToken::new());
        let handle = tokio::spawn(pump.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), 1);

        assert_eq!(rx.recv().await, Some(StreamEvent::Data(json!(0))));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), 2);

        drop(rx);
        assert_eq!(handle.await.unwrap(), StreamState::Disconnected);
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancellation_before_first_pull() {
        let (producer, pulls, cancelled) = ScriptedProducer::new(vec![Step::Yield(json!("a"))]);
        let (tx, rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        token.cancel();

        let state = StreamPump::new(Box::new(producer), tx, token).run().await;
        assert_eq!(state, StreamState::Disconnected);
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(collect(rx).await.is_empty());
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(StreamEvent::Data(json!(1)).label(), "data");
        assert!(!StreamEvent::Data(json!(1)).is_terminal());
        assert!(StreamEvent::Error("x".into()).is_terminal());
        assert!(StreamEvent::Done.is_terminal());
        assert!(!StreamState::Streaming.is_terminal());
        assert!(StreamState::Disconnected.is_terminal());
    }
}
