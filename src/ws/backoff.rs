//! Reconnect backoff policy
//!
//! Exponential backoff with jitter, capped at a maximum delay. The policy
//! never refuses a retry: market data loss is worse than a slow retry
//! loop, so past the escalation threshold the caller logs loudly and keeps
//! going.

use rand::Rng;
use std::time::Duration;

const MULTIPLIER: f64 = 2.0;
const JITTER_FACTOR: f64 = 0.1;

/// Exponential backoff with ±10% jitter
#[derive(Debug)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    current_delay: Duration,
    attempt_count: u32,
}

impl BackoffPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Delay to wait before the next attempt.
    ///
    /// Non-decreasing (up to jitter) until the cap; each call advances the
    /// schedule.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count += 1;
        let delay = apply_jitter(self.current_delay);

        let scaled = self.current_delay.as_millis() as f64 * MULTIPLIER;
        let capped = (scaled as u64).min(self.max_delay.as_millis() as u64);
        self.current_delay = Duration::from_millis(capped);

        delay
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt_count = 0;
    }

    /// Consecutive failed attempts since the last reset
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

fn apply_jitter(duration: Duration) -> Duration {
    let base = duration.as_millis() as f64;
    let range = base * JITTER_FACTOR;
    if range < 1.0 {
        return duration;
    }
    let jitter: f64 = rand::rng().random_range(-range..=range);
    Duration::from_millis((base + jitter).max(1.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_are_non_decreasing_up_to_cap() {
        let mut policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60));

        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = policy.next_delay();
            // ±10% jitter can dip below the nominal value but the schedule
            // still grows monotonically beyond the jitter band.
            assert!(delay.as_millis() as f64 >= previous.as_millis() as f64 * 0.9);
            assert!(delay <= Duration::from_millis(66_000));
            previous = delay;
        }
    }

    #[test]
    fn test_cap_applies() {
        let mut policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(4));
        for _ in 0..10 {
            let delay = policy.next_delay();
            // cap 4s plus 10% jitter headroom
            assert!(delay <= Duration::from_millis(4_400));
        }
    }

    #[test]
    fn test_jitter_randomizes_delays() {
        // Two fresh policies starting from the same failure count should
        // almost never produce an identical schedule.
        let sample = |policy: &mut BackoffPolicy| -> Vec<u128> {
            (0..5).map(|_| policy.next_delay().as_millis()).collect()
        };

        let mut identical = 0;
        for _ in 0..20 {
            let mut a = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60));
            let mut b = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60));
            if sample(&mut a) == sample(&mut b) {
                identical += 1;
            }
        }
        assert!(identical < 2, "jitter produced identical schedules");
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..100 {
            let mut policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60));
            let delay = policy.next_delay().as_millis();
            assert!((900..=1100).contains(&delay), "delay {}ms outside jitter band", delay);
        }
    }

    #[test]
    fn test_reset() {
        let mut policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        let delay = policy.next_delay().as_millis();
        assert!((900..=1100).contains(&delay));
    }

    #[test]
    fn test_attempt_count_grows_forever() {
        let mut policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(20));
        for i in 1..=1000u32 {
            let _ = policy.next_delay();
            assert_eq!(policy.attempt_count(), i);
        }
    }
}
