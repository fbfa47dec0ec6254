//! Exponential reconnect backoff with a ceiling.

use std::time::Duration;

/// Reconnect delay schedule.
///
/// Each call to [`next_delay`](Backoff::next_delay) returns the current
/// delay and doubles it for next time, never exceeding the maximum.
/// [`reset`](Backoff::reset) returns to the minimum.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// A schedule starting at `min` and capped at `max`.
    ///
    /// `max` is raised to `min` if it is smaller.
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    /// The delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// The delay the next call to [`next_delay`](Backoff::next_delay) will return.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Return to the minimum delay.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_to_ceiling_and_stays() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60, 60]);
    }

    #[test]
    fn never_exceeds_max_after_many_failures() {
        let max = Duration::from_millis(750);
        let mut backoff = Backoff::new(Duration::from_millis(10), max);
        for _ in 0..200 {
            assert!(backoff.next_delay() <= max);
        }
    }

    #[test]
    fn reset_returns_to_min() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn inverted_bounds_are_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}
