//! Wall-clock deadline synchronization.
//!
//! Ticket sales open at a scheduled real-world instant, so the synchronizer
//! deliberately compares against wall-clock time, not a monotonic clock. This
//! means a clock adjustment (NTP correction, DST transition) during the wait
//! shifts the release moment — a known fragility accepted because the
//! external requirement is precisely "act at 12:00:00 local time".
//!
//! The wait is the one deliberately unbounded block in the engine: once it
//! begins there is no cancellation, it runs until the deadline is reached.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use tracing::{debug, info};

/// Source of wall-clock readings, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads `chrono::Local`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Blocks the calling stage until a wall-clock time-of-day is reached.
pub struct DeadlineSynchronizer {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl DeadlineSynchronizer {
    pub fn new(clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            clock,
            poll_interval,
        }
    }

    /// The system-clock synchronizer used by real runs.
    pub fn system(poll_interval: Duration) -> Self {
        Self::new(Arc::new(SystemClock), poll_interval)
    }

    /// Block until `target − lead` (today) is reached, polling at the
    /// configured interval. Returns the clock reading that released the wait.
    ///
    /// Never returns early; returns immediately if the adjusted target has
    /// already passed. There is no upper bound on the wait.
    pub async fn wait_until(&self, target: NaiveTime, lead: Duration) -> NaiveDateTime {
        let today = self.clock.now().date();
        let adjusted = today.and_time(target)
            - chrono::Duration::from_std(lead).unwrap_or_else(|_| chrono::Duration::zero());
        info!(%adjusted, "waiting for deadline");

        loop {
            let now = self.clock.now();
            if now >= adjusted {
                debug!(%now, "deadline reached");
                return now;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
