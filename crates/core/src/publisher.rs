//! Status broadcasting.
//!
//! [`StatusPublisher`] fans events out over a bounded
//! `tokio::sync::broadcast` channel. Publishing never blocks and never
//! fails: a subscriber that falls behind by more than the buffer capacity
//! loses its oldest events (the subscription logs the gap and carries on).
//! New subscribers only see events published after they subscribed.
//!
//! On the text stream every event is one `data:` line: a JSON
//! [`StageChange`] or, for heartbeats, the bare uptime in seconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::state::{ProcessingPhase, WorkflowState};

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// Default heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

// ──────────────────────────────────────────────
// Events
// ──────────────────────────────────────────────

/// Payload of a `StageChanged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    /// Case number, incremented on every reset.
    pub case: u64,
    /// Per-workflow event counter, strictly increasing.
    pub sequence: u64,
    pub state: WorkflowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ProcessingPhase>,
}

impl StageChange {
    pub fn new(case: u64, sequence: u64, state: WorkflowState) -> Self {
        let phase = state.phase();
        StageChange {
            case,
            sequence,
            state,
            phase,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    StageChanged(StageChange),
    HeartBeat { uptime_seconds: u64 },
}

impl StatusEvent {
    /// The `data:` payload for this event.
    pub fn to_sse_data(&self) -> Result<String, serde_json::Error> {
        match self {
            StatusEvent::StageChanged(change) => serde_json::to_string(change),
            StatusEvent::HeartBeat { uptime_seconds } => Ok(uptime_seconds.to_string()),
        }
    }

    /// Parse a `data:` payload. A bare integer is a heartbeat.
    pub fn from_sse_data(data: &str) -> Option<StatusEvent> {
        let data = data.trim();
        if let Ok(uptime_seconds) = data.parse::<u64>() {
            return Some(StatusEvent::HeartBeat { uptime_seconds });
        }
        serde_json::from_str(data).ok().map(StatusEvent::StageChanged)
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, StatusEvent::HeartBeat { .. })
    }
}

// ──────────────────────────────────────────────
// Publisher
// ──────────────────────────────────────────────

/// Cheap to clone; clones share the channel and the start instant.
#[derive(Clone)]
pub struct StatusPublisher {
    tx: broadcast::Sender<StatusEvent>,
    started: Instant,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl StatusPublisher {
    /// Uptime is counted from this call.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        StatusPublisher {
            tx,
            started: Instant::now(),
        }
    }

    pub fn subscribe(&self) -> StatusSubscription {
        StatusSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Deliver to current subscribers. Returns how many were reached;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: StatusEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Emit a heartbeat every `period` until the returned task is stopped
    /// or dropped. The first heartbeat fires one period after the call.
    pub fn spawn_heartbeat(&self, period: Duration) -> HeartbeatTask {
        let token = CancellationToken::new();
        let publisher = self.clone();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        let uptime_seconds = publisher.uptime_seconds();
                        publisher.publish(StatusEvent::HeartBeat { uptime_seconds });
                    }
                }
            }
            tracing::debug!("heartbeat stopped");
        });

        HeartbeatTask {
            token,
            handle: Some(handle),
        }
    }
}

/// Handle to the heartbeat task. Dropping it stops the heartbeat.
pub struct HeartbeatTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatTask {
    /// Stop and wait until no further heartbeat can be published.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ──────────────────────────────────────────────
// Subscription
// ──────────────────────────────────────────────

pub struct StatusSubscription {
    rx: broadcast::Receiver<StatusEvent>,
}

impl StatusSubscription {
    /// Next event, skipping over gaps. `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "status subscriber lagged; events dropped");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "status subscriber lagged; events dropped");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// Lazy stream of events; lag gaps are skipped.
    pub fn into_stream(self) -> impl Stream<Item = StatusEvent> + Send + 'static {
        BroadcastStream::new(self.rx).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!(error = %err, "status stream lagged; events dropped");
                None
            }
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
