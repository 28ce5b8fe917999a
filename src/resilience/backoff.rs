//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based); zero for attempt 0.
///
/// Doubles from `base_ms`, capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);
    let spread = capped / 10;
    let jitter = if spread > 0 {
        rand::thread_rng().gen_range(0..spread)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

/// Consecutive failure counter for a polling loop.
///
/// A loop sleeps `extra_delay()` on top of its cadence while failures persist;
/// one success resets it.
#[derive(Debug, Clone)]
pub struct FailureStreak {
    failures: u32,
    base_ms: u64,
    max_ms: u64,
}

impl FailureStreak {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            failures: 0,
            base_ms,
            max_ms,
        }
    }

    pub fn record_failure(&mut self) -> u32 {
        self.failures = self.failures.saturating_add(1);
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn extra_delay(&self) -> Duration {
        calculate_backoff(self.failures, self.base_ms, self.max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_caps() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);
        assert!(calculate_backoff(1, 100, 2000) >= Duration::from_millis(100));
        assert!(calculate_backoff(3, 100, 2000) >= Duration::from_millis(400));
        assert!(calculate_backoff(20, 100, 1000) < Duration::from_millis(1100));
    }

    #[test]
    fn streak_resets_on_success() {
        let mut streak = FailureStreak::new(50, 500);
        assert_eq!(streak.extra_delay(), Duration::ZERO);
        streak.record_failure();
        streak.record_failure();
        assert!(streak.extra_delay() >= Duration::from_millis(100));
        streak.reset();
        assert_eq!(streak.failures(), 0);
        assert_eq!(streak.extra_delay(), Duration::ZERO);
    }
}
