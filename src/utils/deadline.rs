use std::time::{Duration, Instant};

/// Monotonic deadline bounding a discovery loop.
///
/// Measured from construction; never reset between iterations.
#[derive(Debug, Clone, Copy)]
pub struct PollDeadline {
    started: Instant,
    timeout: Duration,
}

impl PollDeadline {
    pub fn start(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    /// Sleep interval for the next pass, clamped so it never overshoots the deadline
    pub fn next_pause(&self, interval: Duration) -> Duration {
        interval.min(self.remaining())
    }
}
