// Retry strategy for webhook delivery: exponential backoff with jitter

use rand::Rng;
use std::time::Duration;

/// Default number of delivery attempts per firing cycle
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry strategy trait for calculating delays between delivery attempts
pub trait RetryStrategy: Send + Sync {
    /// Delay to wait after the failed attempt number `attempt` (1-based).
    /// Returns None once no further attempt is allowed.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Total attempts allowed per cycle, including the first
    fn max_attempts(&self) -> u32;

    /// Check if another attempt may follow attempt number `attempt`
    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}

/// Exponential backoff retry strategy with jitter
/// Default sequence: 2s, 8s, 30s (capped), with up to 10% extra
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(2),
            multiplier: 4,
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a strategy with custom values
    pub fn with_config(
        max_attempts: u32,
        base_delay: Duration,
        multiplier: u32,
        max_delay: Duration,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: multiplier.max(1),
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Delay before jitter: base * multiplier^(attempt-1), capped at max_delay
    fn calculate_base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Add random jitter to prevent synchronized retries
    fn add_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let delay_ms = delay.as_millis() as u64;
        let jitter_range_ms = (delay_ms as f64 * self.jitter_factor) as u64;
        let jitter_ms = if jitter_range_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_range_ms)
        } else {
            0
        };

        Duration::from_millis(delay_ms + jitter_ms)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        Some(self.add_jitter(self.calculate_base_delay(attempt)))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Fixed delay retry strategy (for testing or simple cases)
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self.should_retry(attempt).then_some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> ExponentialBackoff {
        ExponentialBackoff::with_config(
            5,
            Duration::from_secs(2),
            4,
            Duration::from_secs(30),
            0.0,
        )
    }

    #[test]
    fn test_exponential_backoff_sequence() {
        let strategy = no_jitter();
        assert_eq!(strategy.calculate_base_delay(1), Duration::from_secs(2));
        assert_eq!(strategy.calculate_base_delay(2), Duration::from_secs(8));
        // 32s capped at 30s
        assert_eq!(strategy.calculate_base_delay(3), Duration::from_secs(30));
        assert_eq!(strategy.calculate_base_delay(4), Duration::from_secs(30));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let strategy = no_jitter();
        assert_eq!(strategy.calculate_base_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_attempt_limit_enforcement() {
        let strategy = ExponentialBackoff::new();
        assert_eq!(strategy.max_attempts(), DEFAULT_MAX_ATTEMPTS);

        // Attempts 1 and 2 may be followed by another attempt
        assert!(strategy.next_delay(1).is_some());
        assert!(strategy.next_delay(2).is_some());
        // The third attempt is the last one
        assert!(strategy.next_delay(3).is_none());
        assert!(!strategy.should_retry(3));
        assert!(!strategy.should_retry(4));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let strategy = ExponentialBackoff::with_config(
            3,
            Duration::from_millis(1000),
            2,
            Duration::from_secs(60),
            0.5,
        );

        for _ in 0..50 {
            let delay = strategy.next_delay(1).unwrap().as_millis();
            assert!((1000..=1500).contains(&delay), "delay {}ms out of range", delay);
        }
    }

    #[test]
    fn test_jitter_factor_clamping() {
        let low = ExponentialBackoff::with_config(3, Duration::ZERO, 2, Duration::ZERO, -0.5);
        assert_eq!(low.jitter_factor, 0.0);
        let high = ExponentialBackoff::with_config(3, Duration::ZERO, 2, Duration::ZERO, 1.5);
        assert_eq!(high.jitter_factor, 1.0);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let strategy = ExponentialBackoff::with_config(0, Duration::ZERO, 2, Duration::ZERO, 0.0);
        assert_eq!(strategy.max_attempts(), 1);
        assert!(strategy.next_delay(1).is_none());
    }

    #[test]
    fn test_fixed_delay_strategy() {
        let delay = Duration::from_millis(10);
        let strategy = FixedDelay::new(delay, 4);
        for attempt in 1..4 {
            assert_eq!(strategy.next_delay(attempt), Some(delay));
        }
        assert_eq!(strategy.next_delay(4), None);
    }
}
