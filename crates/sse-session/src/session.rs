//! Stream session: one authenticated SSE response from open to close
//!
//! ```text
//! Pending -> Authenticating -> Opening -> Streaming -> Draining -> Closed
//!                 |               |           |
//!                 +---------------+-----------+--> Errored -> Closed
//! ```
//!
//! The session owns the heartbeat handle and releases it on every exit path.
//! A watcher task stops the heartbeat as soon as the peer hangs up; the
//! emission loop notices the closed sink on its next attempt and winds down.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthGate, AuthRequest, Identity, Rejected};
use crate::error::{EmissionError, Error};
use crate::event::StreamEvent;
use crate::frame;
use crate::heartbeat::{HeartbeatHandle, HeartbeatTicker, DEFAULT_HEARTBEAT_INTERVAL};
use crate::sink::{FrameSink, Flushable};
use crate::source::EventStream;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Authenticating,
    Opening,
    Streaming,
    Draining,
    Closed,
    Errored,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Source exhausted, `complete` frame written
    Completed { events: usize },
    /// Source or transport failed, `error` frame attempted
    Failed { events: usize, message: String },
    /// Peer hung up before the source finished
    Disconnected { events: usize },
    /// Auth gate refused the request, no stream opened
    Rejected,
}

/// Per-session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Heartbeat period
    pub heartbeat_interval: Duration,
    /// Token of the comment frame written right after the headers
    pub prologue: String,
    /// Token of the heartbeat comment frame
    pub heartbeat_token: String,
    /// Message of the `complete` frame
    pub complete_message: String,
    /// Frames buffered between the session and the response body
    pub channel_capacity: usize,
}

impl SessionConfig {
    /// Reject settings a session cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Config("heartbeat interval must be positive".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel capacity must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            prologue: "stream-start".to_string(),
            heartbeat_token: "heartbeat".to_string(),
            complete_message: "Build complete!".to_string(),
            channel_capacity: 64,
        }
    }
}

/// One SSE stream
pub struct Session {
    id: String,
    config: SessionConfig,
    sink: Arc<dyn FrameSink>,
    flusher: Option<Arc<dyn Flushable>>,
    state: SessionState,
    started: bool,
    terminal: bool,
    heartbeat: Option<HeartbeatHandle>,
    identity: Option<Identity>,
    emitted: usize,
    done: CancellationToken,
}

impl Session {
    /// Create a session writing to `sink`
    pub fn new(sink: Arc<dyn FrameSink>, config: SessionConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            sink,
            flusher: None,
            state: SessionState::Pending,
            started: false,
            terminal: false,
            heartbeat: None,
            identity: None,
            emitted: 0,
            done: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Business events written so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Heartbeats written so far
    pub fn heartbeats(&self) -> u64 {
        self.heartbeat.as_ref().map_or(0, HeartbeatHandle::beats)
    }

    /// Whether the heartbeat is still scheduled
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(HeartbeatHandle::is_running)
    }

    /// Run the auth gate, if any
    ///
    /// On rejection the session is closed without writing anything; the
    /// caller answers with [`crate::auth::unauthorized`].
    pub async fn authenticate(
        &mut self,
        gate: Option<&dyn AuthGate>,
        request: &AuthRequest,
    ) -> Result<(), Rejected> {
        self.state = SessionState::Authenticating;

        let Some(gate) = gate else {
            self.state = SessionState::Opening;
            return Ok(());
        };

        match gate.authenticate(request).await {
            Ok(identity) => {
                tracing::info!(
                    session_id = %self.id,
                    subject = %identity.subject,
                    gate = gate.name(),
                    "Stream authenticated"
                );
                self.identity = Some(identity);
                self.state = SessionState::Opening;
                Ok(())
            }
            Err(rejected) => {
                tracing::warn!(
                    session_id = %self.id,
                    client_ip = ?request.client_ip,
                    reason = %rejected.reason,
                    "Stream rejected"
                );
                self.terminal = true;
                self.state = SessionState::Closed;
                Err(rejected)
            }
        }
    }

    /// Write the prologue and start the heartbeat
    ///
    /// On failure the session is already closed.
    pub async fn open(&mut self) -> Result<(), EmissionError> {
        if self.terminal || self.started {
            return Ok(());
        }
        self.state = SessionState::Opening;
        self.flusher = self.sink.clone().into_flushable();

        if let Err(e) = self.write(frame::comment(&self.config.prologue)).await {
            tracing::warn!(session_id = %self.id, error = %e, "Failed to write stream prologue");
            self.fail(e.to_string()).await;
            return Err(e);
        }
        self.started = true;
        self.state = SessionState::Streaming;

        let heartbeat = HeartbeatTicker::start(
            self.config.heartbeat_interval,
            &self.config.heartbeat_token,
            self.sink.clone(),
            self.flusher.clone(),
        );
        self.spawn_disconnect_watcher(&heartbeat);
        self.heartbeat = Some(heartbeat);

        tracing::info!(
            session_id = %self.id,
            sink = self.sink.name(),
            flushable = self.flusher.is_some(),
            heartbeat_ms = self.config.heartbeat_interval.as_millis() as u64,
            "Stream opened"
        );
        Ok(())
    }

    fn spawn_disconnect_watcher(&self, heartbeat: &HeartbeatHandle) {
        let stopper = heartbeat.stopper();
        let sink = self.sink.clone();
        let done = self.done.clone();
        let session_id = self.id.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = done.cancelled() => {}
                _ = sink.closed() => {
                    stopper.stop();
                    tracing::info!(session_id = %session_id, "Client disconnected");
                }
            }
        });
    }

    /// Write one business event
    ///
    /// Before the stream has started this is a logged no-op.
    pub async fn emit(&mut self, event: &StreamEvent) -> Result<(), EmissionError> {
        if !self.started {
            tracing::warn!(session_id = %self.id, step = %event.step, "Stream not started, skipping emit");
            return Ok(());
        }
        if self.terminal {
            return Err(EmissionError::SinkClosed);
        }
        if self.sink.is_closed() {
            return Err(EmissionError::PeerClosed);
        }

        self.write(frame::encode(event)).await?;
        if !event.is_terminal() {
            self.emitted += 1;
        }
        tracing::debug!(session_id = %self.id, step = %event.step, "Event emitted");
        Ok(())
    }

    async fn write(&self, frame: bytes::Bytes) -> Result<(), EmissionError> {
        self.sink.write_frame(frame).await?;
        if let Some(flusher) = &self.flusher {
            if let Err(e) = flusher.flush().await {
                tracing::debug!(session_id = %self.id, error = %e, "Flush failed");
            }
        }
        Ok(())
    }

    /// Stream every event from `events`, then close
    pub async fn run(mut self, mut events: EventStream) -> SessionOutcome {
        if self.terminal {
            return SessionOutcome::Rejected;
        }
        if !self.started {
            if let Err(e) = self.open().await {
                return SessionOutcome::Failed {
                    events: 0,
                    message: e.to_string(),
                };
            }
        }

        while let Some(item) = events.next().await {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!(session_id = %self.id, error = %message, "Event source failed");
                    self.finish(Some(StreamEvent::error(message.clone()))).await;
                    return SessionOutcome::Failed {
                        events: self.emitted,
                        message,
                    };
                }
            };

            match self.emit(&item.event).await {
                Ok(()) => {}
                Err(EmissionError::PeerClosed) | Err(EmissionError::SinkClosed) => {
                    return self.disconnected().await;
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.id, step = %item.event.step, error = %e, "Emit failed");
                }
            }

            if let Some(delay) = item.delay {
                tokio::time::sleep(delay).await;
            }
        }

        if self.sink.is_closed() {
            return self.disconnected().await;
        }

        let complete = StreamEvent::complete(self.config.complete_message.clone());
        self.finish(Some(complete)).await;
        tracing::info!(
            session_id = %self.id,
            events = self.emitted,
            "Stream complete"
        );
        SessionOutcome::Completed {
            events: self.emitted,
        }
    }

    async fn disconnected(&mut self) -> SessionOutcome {
        self.finish(None).await;
        tracing::info!(session_id = %self.id, events = self.emitted, "Stream ended by client");
        SessionOutcome::Disconnected {
            events: self.emitted,
        }
    }

    /// Errored path: best-effort `error` frame, then close
    async fn fail(&mut self, message: String) {
        if self.terminal {
            return;
        }
        self.state = SessionState::Errored;
        self.finish(Some(StreamEvent::error(message))).await;
    }

    /// Terminal transition; runs at most once
    ///
    /// The heartbeat is stopped before the terminal frame so that frame is
    /// always the last thing on the wire.
    async fn finish(&mut self, terminal: Option<StreamEvent>) {
        if self.terminal {
            return;
        }
        self.terminal = true;
        if self.state != SessionState::Errored {
            self.state = SessionState::Draining;
        }

        self.done.cancel();
        if let Some(heartbeat) = self.heartbeat.take() {
            let beats = heartbeat.beats();
            heartbeat.shutdown().await;
            tracing::debug!(session_id = %self.id, beats, "Heartbeat stopped");
        }

        if let Some(event) = terminal {
            if self.started && !self.sink.is_closed() {
                if let Err(e) = self.write(frame::encode(&event)).await {
                    tracing::debug!(session_id = %self.id, error = %e, "Terminal frame not delivered");
                }
            } else if !self.started {
                tracing::warn!(session_id = %self.id, step = %event.step, "Stream not started, skipping emit");
            }
        }

        self.sink.close().await;
        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Heartbeat handle cancels itself on drop; release the watcher too.
        self.done.cancel();
    }
}
