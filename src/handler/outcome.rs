//! Handler results: one value, or a pull-based producer of values
//!
//! The handler decides the shape by which constructor it calls, so the
//! server's dispatch is a plain `match` instead of a runtime type probe.
//!
//! ```text
//! InvocationOutcome::single(v)   ──► Single(Value)          ──► JSON body
//! InvocationOutcome::stream(s)   ──► Stream(StreamProducer) ──► SSE
//! InvocationOutcome::iter(i)     ──► Stream(IterProducer)   ──► SSE
//! ```

use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use super::error::HandlerError;

/// A lazy, finite, non-restartable source of JSON values.
///
/// The server calls [`next`](Producer::next) one value at a time and never
/// asks for the next value before the previous one has been handed to the
/// transport. `None` means the sequence is exhausted; `Some(Err(_))` ends the
/// stream with an error event.
#[async_trait]
pub trait Producer: Send {
    /// Pull the next value
    async fn next(&mut self) -> Option<Result<Value, HandlerError>>;

    /// Called once when the client disconnects mid-stream. Must release any
    /// resource the producer holds; `next` is never called afterwards.
    fn cancel(&mut self) {}
}

/// What a handler returned, tagged once and never re-examined
pub enum InvocationOutcome {
    /// A single JSON value sent as the response body
    Single(Value),
    /// A producer whose values are sent as SSE `data` events
    Stream(Box<dyn Producer>),
}

impl InvocationOutcome {
    /// Serialize `value` into a single-value outcome
    pub fn single<T: Serialize>(value: T) -> Result<Self, HandlerError> {
        Ok(InvocationOutcome::Single(serde_json::to_value(value)?))
    }

    /// Stream the items of an async stream.
    ///
    /// An `Err` item ends the stream with an error event. A value that fails
    /// to serialize is reported the same way.
    pub fn stream<S, T, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Serialize,
        E: Into<HandlerError>,
    {
        InvocationOutcome::Stream(Box::new(StreamProducer::new(stream)))
    }

    /// Stream the items of a lazily evaluated iterator
    pub fn iter<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Serialize,
    {
        InvocationOutcome::Stream(Box::new(IterProducer::new(items)))
    }

    /// Wrap a custom producer
    pub fn from_producer<P: Producer + 'static>(producer: P) -> Self {
        InvocationOutcome::Stream(Box::new(producer))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, InvocationOutcome::Stream(_))
    }
}

impl std::fmt::Debug for InvocationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationOutcome::Single(value) => f.debug_tuple("Single").field(value).finish(),
            InvocationOutcome::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Producer over a `futures` stream.
///
/// Dropping the inner stream is how resources are released: on exhaustion,
/// on cancel, or when the producer itself is dropped.
pub struct StreamProducer {
    inner: Option<BoxStream<'static, Result<Value, HandlerError>>>,
}

impl StreamProducer {
    pub fn new<S, T, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Serialize,
        E: Into<HandlerError>,
    {
        let values = stream.map(|item| {
            item.map_err(Into::into)
                .and_then(|value| serde_json::to_value(value).map_err(HandlerError::from))
        });
        Self {
            inner: Some(values.boxed()),
        }
    }
}

#[async_trait]
impl Producer for StreamProducer {
    async fn next(&mut self) -> Option<Result<Value, HandlerError>> {
        let stream = self.inner.as_mut()?;
        let item = stream.next().await;
        if item.is_none() {
            self.inner = None;
        }
        item
    }

    fn cancel(&mut self) {
        self.inner = None;
    }
}

/// Producer over a synchronous iterator, evaluated one item per pull
pub struct IterProducer {
    inner: Option<Box<dyn Iterator<Item = Result<Value, HandlerError>> + Send>>,
}

impl IterProducer {
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Serialize,
    {
        let values = items
            .into_iter()
            .map(|value| serde_json::to_value(value).map_err(HandlerError::from));
        Self {
            inner: Some(Box::new(values)),
        }
    }
}

#[async_trait]
impl Producer for IterProducer {
    async fn next(&mut self) -> Option<Result<Value, HandlerError>> {
        let iter = self.inner.as_mut()?;
        let item = iter.next();
        if item.is_none() {
            self.inner = None;
        }
        item
    }

    fn cancel(&mut self) {
        self.inner = None;
    }
}
