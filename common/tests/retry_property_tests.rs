// Property-based tests for delivery retry backoff

use common::retry::{ExponentialBackoff, RetryStrategy};
use proptest::prelude::*;
use std::time::Duration;

/// Exactly `max_attempts - 1` delays are handed out per cycle
#[test]
fn property_retry_limit_enforcement() {
    proptest!(|(max_attempts in 1u32..10, attempt in 1u32..20)| {
        let strategy = ExponentialBackoff::with_config(
            max_attempts,
            Duration::from_millis(100),
            2,
            Duration::from_secs(10),
            0.1,
        );

        let delay = strategy.next_delay(attempt);
        if attempt < max_attempts {
            prop_assert!(delay.is_some(), "expected a delay after attempt {}", attempt);
        } else {
            prop_assert!(delay.is_none(), "no delay expected after attempt {}", attempt);
        }
    });
}

/// Delay stays within [base_capped, base_capped * (1 + jitter)]
#[test]
fn property_backoff_bounds() {
    proptest!(|(
        attempt in 1u32..8,
        base_ms in 1u64..5_000,
        multiplier in 1u32..6,
        max_ms in 1u64..60_000,
        jitter in 0.0f64..1.0,
    )| {
        let strategy = ExponentialBackoff::with_config(
            10,
            Duration::from_millis(base_ms),
            multiplier,
            Duration::from_millis(max_ms),
            jitter,
        );

        let delay = strategy.next_delay(attempt).unwrap().as_millis() as u64;
        let expected = base_ms
            .saturating_mul((multiplier as u64).saturating_pow(attempt - 1))
            .min(max_ms);
        let upper = expected + (expected as f64 * jitter) as u64;

        prop_assert!(delay >= expected, "delay {} below {}", delay, expected);
        prop_assert!(delay <= upper, "delay {} above {}", delay, upper);
    });
}

/// Without jitter, successive delays never shrink
#[test]
fn property_backoff_non_decreasing() {
    proptest!(|(base_ms in 1u64..5_000, multiplier in 1u32..6, max_ms in 1u64..60_000)| {
        let strategy = ExponentialBackoff::with_config(
            8,
            Duration::from_millis(base_ms),
            multiplier,
            Duration::from_millis(max_ms),
            0.0,
        );

        let delays: Vec<Duration> = (1..8).filter_map(|a| strategy.next_delay(a)).collect();
        prop_assert_eq!(delays.len(), 7);
        for pair in delays.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    });
}
