//! Time sources for expiry checks and the poll timer.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;

pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Wall-clock reading plus a sleep primitive.
///
/// The poller only ever waits through [`Clock::sleep`], so a clock whose
/// notion of time is virtual makes polling deterministic as well.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Real time: `chrono` for the date, tokio for sleeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Time derived from tokio's clock, anchored to the wall clock at creation.
///
/// Under a paused runtime (`#[tokio::test(start_paused = true)]`) both
/// `now_millis` and `sleep` follow virtual time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_millis: i64,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp_millis())
    }

    /// Pin the current tokio instant to `epoch_millis`.
    pub fn starting_at(epoch_millis: i64) -> Self {
        Self {
            anchor_millis: epoch_millis,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        let elapsed = tokio::time::Instant::now().duration_since(self.anchor);
        self.anchor_millis + elapsed.as_millis() as i64
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}
