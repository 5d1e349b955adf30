use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Wall-clock milliseconds derived from tokio's monotonic clock.
///
/// Under a paused tokio runtime the reading only moves when tokio advances time, which keeps
/// driver and runner timestamps deterministic in tests.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch_ms: u64,
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self::starting_at(epoch_ms)
    }

    pub fn starting_at(epoch_ms: u64) -> Self {
        Self {
            epoch_ms,
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch_ms + self.start.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
