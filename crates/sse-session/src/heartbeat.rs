//! Heartbeat ticker
//!
//! Writes a comment frame on a fixed period so proxies and load balancers see
//! traffic during long gaps between events. Comment frames never reach the
//! client's event handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::frame;
use crate::sink::{FrameSink, Flushable};

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Spawns heartbeat tasks
pub struct HeartbeatTicker;

impl HeartbeatTicker {
    /// Start a ticker writing `: <token>` every `period`
    ///
    /// The first beat fires one full period after start. A failed write stops
    /// the ticker.
    pub fn start(
        period: Duration,
        token: &str,
        sink: Arc<dyn FrameSink>,
        flusher: Option<Arc<dyn Flushable>>,
    ) -> HeartbeatHandle {
        let cancel = CancellationToken::new();
        let beats = Arc::new(AtomicU64::new(0));

        if period.is_zero() {
            tracing::warn!("Heartbeat period is zero, heartbeat disabled");
            cancel.cancel();
            return HeartbeatHandle {
                cancel,
                beats,
                task: None,
            };
        }

        let frame = frame::comment(token);
        let task_cancel = cancel.clone();
        let task_beats = beats.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let result = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    result = sink.write_frame(frame.clone()) => result,
                };

                match result {
                    Ok(()) => {
                        let count = task_beats.fetch_add(1, Ordering::SeqCst) + 1;
                        if let Some(flusher) = &flusher {
                            if let Err(e) = flusher.flush().await {
                                tracing::debug!(error = %e, "Heartbeat flush failed");
                            }
                        }
                        tracing::trace!(beats = count, "Heartbeat sent");
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, sink = sink.name(), "Heartbeat write failed, stopping ticker");
                        task_cancel.cancel();
                        break;
                    }
                }
            }
        });

        HeartbeatHandle {
            cancel,
            beats,
            task: Some(task),
        }
    }
}

/// Owning handle to a running heartbeat
///
/// Dropping the handle stops the ticker.
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    beats: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Stop the ticker. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the ticker and wait until no heartbeat write is in flight
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// A cloneable stop-only view for other tasks
    pub fn stopper(&self) -> HeartbeatStopper {
        HeartbeatStopper {
            cancel: self.cancel.clone(),
        }
    }

    /// Successful heartbeat writes so far
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }

    /// Whether the ticker is still scheduled
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Stop-only handle shared with the disconnect watcher
#[derive(Clone)]
pub struct HeartbeatStopper {
    cancel: CancellationToken,
}

impl HeartbeatStopper {
    /// Stop the ticker. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
