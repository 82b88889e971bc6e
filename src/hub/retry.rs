use std::time::Duration;

/// Delay schedule for automatic reconnection: a short delay for the first few
/// attempts, a longer one after that, and no cap on the number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub fast_delay: Duration,
    pub slow_delay: Duration,
    pub fast_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            fast_delay: Duration::from_millis(2000),
            slow_delay: Duration::from_millis(5000),
            fast_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt, given how many retries already happened.
    pub fn next_delay(&self, previous_retry_count: u32) -> Duration {
        if previous_retry_count < self.fast_attempts {
            self.fast_delay
        } else {
            self.slow_delay
        }
    }
}
