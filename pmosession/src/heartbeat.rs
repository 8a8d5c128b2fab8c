//! Stall detection for live streams
//!
//! The feeder records a heartbeat each time bytes move; the watchdog polls
//! that timestamp and aborts the session once the source has been silent
//! for longer than the stall timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// Default delay between two watchdog checks
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(2);

/// Timestamp of the last successful byte transfer
///
/// Written by the feeder, read by the watchdog. The stored value never
/// moves backwards.
#[derive(Debug)]
pub struct HeartbeatState {
    origin: Instant,
    last_seen_ms: AtomicU64,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Starts with a heartbeat at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    /// Records a transfer at the current instant
    pub fn beat(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_seen_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed))
    }

    /// Time elapsed since the last transfer
    pub fn silence(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_seen())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Running,
    TimedOut,
    Finished,
}

pub struct HeartbeatWatchdog {
    timeout: Duration,
    interval: Duration,
    state: WatchdogState,
}

impl HeartbeatWatchdog {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            state: WatchdogState::Running,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Polls `heartbeat` until the token is cancelled or the stream stalls
    ///
    /// Returns `Ok` when cancelled (the stream ended or the session is being
    /// torn down) and [`Error::StreamTimeout`] when the silence exceeds the
    /// timeout. A stall is never reported once cancellation was requested.
    pub async fn run(&mut self, heartbeat: &HeartbeatState, cancel: &CancellationToken) -> Result<()> {
        info!(
            timeout_ms = self.timeout.as_millis() as u64,
            interval_ms = self.interval.as_millis() as u64,
            "Watchdog started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.state = WatchdogState::Finished;
                    debug!("Watchdog stopped");
                    return Ok(());
                }
                _ = sleep(self.interval) => {}
            }

            let silence = heartbeat.silence();
            debug!(silence_ms = silence.as_millis() as u64, "Watchdog check");

            if silence > self.timeout && !cancel.is_cancelled() {
                self.state = WatchdogState::TimedOut;
                error!(
                    silence_ms = silence.as_millis() as u64,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Stream stalled"
                );
                return Err(Error::StreamTimeout(silence));
            }
        }
    }
}
