use std::time::Duration;

/// Bounded retry with linearly increasing delay.
///
/// Attempt `n` (zero-based) waits `base_delay * (n + 1)` before the next try,
/// so the defaults give 500ms, 1s, 1.5s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// No retries at all.
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay: Duration::ZERO,
    };

    /// Delay to wait after the failed attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Whether another try is allowed after `attempt` (zero-based) failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Server-side failures are worth another try; client errors are not.
    pub fn is_retryable_status(status: u16) -> bool {
        (500..=599).contains(&status)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}
