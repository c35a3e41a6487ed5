//! Frame sinks: where a session writes its frames
//!
//! Implement `FrameSink` to plug a session into any transport. A sink that
//! can force buffered bytes onto the wire also implements `Flushable` and
//! exposes it through `FrameSink::into_flushable`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EmissionError;

/// Trait for frame transports
///
/// Each `write_frame` call carries exactly one complete frame; implementations
/// must deliver it without interleaving it with other writes.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Write one complete frame
    async fn write_frame(&self, frame: Bytes) -> Result<(), EmissionError>;

    /// Whether the peer has gone away
    fn is_closed(&self) -> bool;

    /// Resolve once the peer has gone away
    async fn closed(&self);

    /// Close the response; later writes fail with `SinkClosed`
    async fn close(&self);

    /// Optional flush capability, probed once when the session opens
    fn into_flushable(self: Arc<Self>) -> Option<Arc<dyn Flushable>> {
        None
    }

    /// Return the sink name (for logging)
    fn name(&self) -> &'static str;
}

/// Capability for sinks that buffer and can be forced to emit
#[async_trait]
pub trait Flushable: Send + Sync {
    /// Push any buffered bytes to the peer
    async fn flush(&self) -> Result<(), EmissionError>;
}

/// Sink backed by an mpsc channel feeding an HTTP response body
///
/// Each frame becomes one body chunk. The peer is considered gone once the
/// server drops the body, which is what hyper does when the client hangs up.
pub struct ChannelSink {
    sender: tokio::sync::Mutex<Option<mpsc::Sender<Bytes>>>,
    peer_gone: CancellationToken,
}

impl ChannelSink {
    /// Create a sink and the body stream it feeds
    pub fn new(capacity: usize) -> (Arc<Self>, FrameBody) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let peer_gone = CancellationToken::new();
        let sink = Arc::new(Self {
            sender: tokio::sync::Mutex::new(Some(tx)),
            peer_gone: peer_gone.clone(),
        });
        (
            sink,
            FrameBody {
                receiver: rx,
                on_drop: peer_gone,
            },
        )
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn write_frame(&self, frame: Bytes) -> Result<(), EmissionError> {
        if self.peer_gone.is_cancelled() {
            return Err(EmissionError::PeerClosed);
        }
        // Clone out of the lock so a slow peer never blocks `close`.
        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or(EmissionError::SinkClosed)?;
        sender
            .send(frame)
            .await
            .map_err(|_| EmissionError::PeerClosed)
    }

    fn is_closed(&self) -> bool {
        self.peer_gone.is_cancelled()
    }

    async fn closed(&self) {
        self.peer_gone.cancelled().await
    }

    async fn close(&self) {
        self.sender.lock().await.take();
    }

    fn name(&self) -> &'static str {
        "Channel"
    }
}

/// Body stream paired with a `ChannelSink`
///
/// Dropping it signals the sink that the peer is gone.
pub struct FrameBody {
    receiver: mpsc::Receiver<Bytes>,
    on_drop: CancellationToken,
}

impl Drop for FrameBody {
    fn drop(&mut self) {
        self.on_drop.cancel();
    }
}

impl Stream for FrameBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

/// One operation observed by a `MemorySink`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    /// A frame was written
    Frame(Bytes),
    /// A flush was requested
    Flush,
    /// The sink was closed
    Close,
}

/// In-memory sink that records every operation
///
/// Suitable for development and testing. Supports simulated peer disconnects
/// and injected write failures.
#[derive(Default)]
pub struct MemorySink {
    journal: Mutex<Vec<SinkOp>>,
    peer_gone: CancellationToken,
    closed: AtomicBool,
    fail_after: Mutex<Option<usize>>,
    attempts_after_disconnect: AtomicUsize,
    attempts_after_close: AtomicUsize,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every write once `writes` frames have been accepted
    pub fn fail_writes_after(&self, writes: usize) {
        *self.fail_after.lock().unwrap_or_else(PoisonError::into_inner) = Some(writes);
    }

    /// Simulate the client closing the connection
    pub fn disconnect(&self) {
        self.peer_gone.cancel();
    }

    /// Every recorded operation, in order
    pub fn journal(&self) -> Vec<SinkOp> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Written frames, in order
    pub fn frames(&self) -> Vec<Bytes> {
        self.journal()
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::Frame(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    /// All written frames concatenated as text, as a client would receive them
    pub fn text(&self) -> String {
        self.frames()
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }

    /// Number of flushes requested
    pub fn flush_count(&self) -> usize {
        self.journal()
            .iter()
            .filter(|op| **op == SinkOp::Flush)
            .count()
    }

    /// Whether `close` has been called
    pub fn is_shut(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Writes attempted after `disconnect`
    pub fn attempts_after_disconnect(&self) -> usize {
        self.attempts_after_disconnect.load(Ordering::SeqCst)
    }

    /// Writes attempted after `close`
    pub fn attempts_after_close(&self) -> usize {
        self.attempts_after_close.load(Ordering::SeqCst)
    }

    fn record(&self, op: SinkOp) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write_frame(&self, frame: Bytes) -> Result<(), EmissionError> {
        if self.peer_gone.is_cancelled() {
            self.attempts_after_disconnect.fetch_add(1, Ordering::SeqCst);
            return Err(EmissionError::PeerClosed);
        }
        if self.closed.load(Ordering::SeqCst) {
            self.attempts_after_close.fetch_add(1, Ordering::SeqCst);
            return Err(EmissionError::SinkClosed);
        }

        let limit = *self.fail_after.lock().unwrap_or_else(PoisonError::into_inner);
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = limit {
            let written = journal
                .iter()
                .filter(|op| matches!(op, SinkOp::Frame(_)))
                .count();
            if written >= limit {
                return Err(EmissionError::Failed("injected write failure".to_string()));
            }
        }
        journal.push(SinkOp::Frame(frame));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.peer_gone.is_cancelled()
    }

    async fn closed(&self) {
        self.peer_gone.cancelled().await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.record(SinkOp::Close);
        }
    }

    fn into_flushable(self: Arc<Self>) -> Option<Arc<dyn Flushable>> {
        Some(self)
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

#[async_trait]
impl Flushable for MemorySink {
    async fn flush(&self) -> Result<(), EmissionError> {
        if self.peer_gone.is_cancelled() {
            return Err(EmissionError::PeerClosed);
        }
        self.record(SinkOp::Flush);
        Ok(())
    }
}
