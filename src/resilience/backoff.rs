//! Exponential backoff and jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// Used by the endpoint watch loop between reconnect attempts.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    Duration::from_millis(capped_delay + jitter_ms(capped_delay / 10))
}

/// A fixed delay plus up to `spread` of random jitter.
///
/// Spreads clients that all learned about the same failover at once.
pub fn with_jitter(delay: Duration, spread: Duration) -> Duration {
    delay + Duration::from_millis(jitter_ms(spread.as_millis() as u64))
}

fn jitter_ms(range: u64) -> u64 {
    if range > 0 {
        rand::thread_rng().gen_range(0..range)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000);
        assert!(max.as_millis() < 1100);
    }

    #[test]
    fn test_zero_attempt_has_no_delay() {
        assert_eq!(calculate_backoff(0, 100, 1000), Duration::ZERO);
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(2000);
        for _ in 0..50 {
            let d = with_jitter(base, Duration::from_millis(500));
            assert!(d >= base && d < base + Duration::from_millis(500));
        }
        assert_eq!(with_jitter(base, Duration::ZERO), base);
    }
}
