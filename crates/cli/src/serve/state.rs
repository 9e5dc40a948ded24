//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use kycflow_core::WorkflowHandle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::RATE_LIMIT_WINDOW_SECS;
use crate::config::ProjectSection;

/// Per-IP request tracker: (request count, window start time).
type IpTracker = HashMap<IpAddr, (u64, Instant)>;

/// In-memory fixed-window limiter keyed by client IP.
pub(crate) struct RateLimiter {
    tracker: Mutex<IpTracker>,
    pub(crate) max_requests: u64,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64) -> Self {
        Self {
            tracker: Mutex::new(HashMap::new()),
            max_requests,
        }
    }

    /// Ok(()) if allowed, Err(retry_after_secs) if the window is exhausted.
    /// A limit of zero disables limiting.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        if self.max_requests == 0 {
            return Ok(());
        }
        let mut tracker = self.tracker.lock().await;
        // Expired windows are dropped so idle clients don't accumulate.
        tracker.retain(|_, (_, start)| {
            now.saturating_duration_since(*start).as_secs() < RATE_LIMIT_WINDOW_SECS
        });
        let entry = tracker.entry(ip).or_insert((0, now));
        let elapsed = now.saturating_duration_since(entry.1).as_secs();

        entry.0 += 1;
        if entry.0 > self.max_requests {
            Err(RATE_LIMIT_WINDOW_SECS.saturating_sub(elapsed))
        } else {
            Ok(())
        }
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.tracker.lock().await.len()
    }
}

/// Shared by all handlers.
pub(crate) struct AppState {
    pub(crate) workflow: WorkflowHandle,
    pub(crate) project: ProjectSection,
    pub(crate) rate_limiter: RateLimiter,
    /// None = no auth required.
    pub(crate) api_key: Option<String>,
    /// Cancelled on shutdown; open event streams end with it.
    pub(crate) shutdown: CancellationToken,
}
