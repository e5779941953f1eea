//! Latency statistics for one depth stream

use std::fmt;
use std::time::Duration;

/// Whole multiples of this are treated as clock skew between the exchange
/// and the local host, not as network latency.
pub const SKEW_ALIGNMENT: Duration = Duration::from_secs(60);

/// Strip the minute-aligned part of an event-to-receipt difference.
///
/// Only valid while the true one-way latency stays below one minute.
pub fn strip_clock_skew(abs_diff: Duration) -> Duration {
    let alignment = SKEW_ALIGNMENT.as_nanos();
    let remainder = abs_diff.as_nanos() % alignment;
    Duration::from_nanos(remainder as u64)
}

/// Running min / max / average of latency samples.
///
/// A fresh tracker holds sentinels: `min` is `Duration::MAX` and `max` is
/// `Duration::ZERO`, the lowest value a `Duration` can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    min: Duration,
    max: Duration,
    sum: Duration,
    count: u64,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            min: Duration::MAX,
            max: Duration::ZERO,
            sum: Duration::ZERO,
            count: 0,
        }
    }
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the statistics
    pub fn add_update(&mut self, sample: Duration) {
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.sum = self.sum.saturating_add(sample);
        self.count += 1;
    }

    /// Reset to the freshly constructed state
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// True iff no sample has been recorded
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> Duration {
        self.sum
    }

    pub fn min(&self) -> Option<Duration> {
        (!self.is_empty()).then_some(self.min)
    }

    pub fn max(&self) -> Option<Duration> {
        (!self.is_empty()).then_some(self.max)
    }

    /// Mean sample, or the (zero) sum when there are no samples
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return self.sum;
        }
        Duration::from_nanos((self.sum.as_nanos() / u128::from(self.count)) as u64)
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        write!(
            f,
            "min: {}us, max: {}us, avg: {}us",
            self.min.as_micros(),
            self.max.as_micros(),
            self.average().as_micros()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_of_no_samples_is_zero() {
        let stats = LatencyStats::new();
        assert_eq!(stats.average(), Duration::ZERO);
        assert_eq!(stats.min(), None);
        assert_eq!(stats.max(), None);
        assert_eq!(stats.to_string(), "<empty>");
    }

    #[test]
    fn test_single_sample() {
        let mut stats = LatencyStats::new();
        let sample = Duration::from_micros(1500);
        stats.add_update(sample);

        assert_eq!(stats.min(), Some(sample));
        assert_eq!(stats.max(), Some(sample));
        assert_eq!(stats.average(), sample);
        assert_eq!(stats.count(), 1);
    }

    #[test]
    fn test_min_max_average() {
        let mut stats = LatencyStats::new();
        for ms in [30, 10, 20] {
            stats.add_update(Duration::from_millis(ms));
        }
        assert_eq!(stats.min(), Some(Duration::from_millis(10)));
        assert_eq!(stats.max(), Some(Duration::from_millis(30)));
        assert_eq!(stats.average(), Duration::from_millis(20));
        assert_eq!(stats.sum(), Duration::from_millis(60));
        assert_eq!(stats.to_string(), "min: 10000us, max: 30000us, avg: 20000us");
    }

    #[test]
    fn test_clear_restores_initial_state() {
        let mut stats = LatencyStats::new();
        stats.add_update(Duration::from_millis(5));
        stats.add_update(Duration::from_millis(7));
        stats.clear();
        assert_eq!(stats, LatencyStats::new());
    }

    // Historically the emptiness predicate answered the opposite question.
    #[test]
    fn test_is_empty_polarity() {
        let mut stats = LatencyStats::new();
        assert!(stats.is_empty(), "no samples must report empty");

        stats.add_update(Duration::from_millis(1));
        assert!(!stats.is_empty(), "a recorded sample must report non-empty");

        stats.clear();
        assert!(stats.is_empty());
    }

    #[test]
    fn test_strip_clock_skew() {
        assert_eq!(
            strip_clock_skew(Duration::from_millis(500)),
            Duration::from_millis(500)
        );
        assert_eq!(
            strip_clock_skew(Duration::from_secs(3 * 60) + Duration::from_millis(42)),
            Duration::from_millis(42)
        );
        assert_eq!(strip_clock_skew(Duration::from_secs(60)), Duration::ZERO);
    }
}
