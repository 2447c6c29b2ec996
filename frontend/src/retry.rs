use std::time::Duration;

/// Backoff for the initial blog fetch. Polling ticks never use it; a failed
/// tick just waits for the next one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before the next try after `attempt` (1-based) failed, or `None`
    /// once the attempts are used up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let multiplier = self.factor.max(1).saturating_pow(exponent);
        Some(
            self.base_delay
                .checked_mul(multiplier)
                .map_or(self.max_delay, |delay| delay.min(self.max_delay)),
        )
    }
}
