//! Rolling throughput estimation.

use std::time::{Duration, Instant};

/// Minimum wall-clock window before the rate is recomputed. Samples closer
/// together than this return the previous estimate, keeping the number
/// stable when events arrive in bursts.
const MIN_WINDOW: Duration = Duration::from_millis(100);

/// Estimates throughput as bytes-delta over wall-clock-delta per window.
#[derive(Debug)]
pub struct ThroughputEstimator {
    window_start: Instant,
    bytes_at_window_start: u64,
    last_rate: u64,
}

impl ThroughputEstimator {
    /// Start estimating from zero bytes at `now`.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            bytes_at_window_start: 0,
            last_rate: 0,
        }
    }

    /// Record the current byte total and return the rolling estimate in
    /// bytes per second.
    pub fn sample(&mut self, total_bytes: u64) -> u64 {
        self.sample_at(total_bytes, Instant::now())
    }

    fn sample_at(&mut self, total_bytes: u64, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < MIN_WINDOW {
            return self.last_rate;
        }

        let delta = total_bytes.saturating_sub(self.bytes_at_window_start);
        self.last_rate = (delta as f64 / elapsed.as_secs_f64()) as u64;
        self.window_start = now;
        self.bytes_at_window_start = total_bytes;
        self.last_rate
    }
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_rate_is_zero() {
        let mut est = ThroughputEstimator::starting_at(Instant::now());
        assert_eq!(est.sample_at(0, Instant::now()), 0);
    }

    #[test]
    fn test_rate_is_delta_over_elapsed() {
        let start = Instant::now();
        let mut est = ThroughputEstimator::starting_at(start);

        let rate = est.sample_at(1_000_000, start + Duration::from_secs(1));
        assert_eq!(rate, 1_000_000);

        // Another second, another half megabyte.
        let rate = est.sample_at(1_500_000, start + Duration::from_secs(2));
        assert_eq!(rate, 500_000);
    }

    #[test]
    fn test_samples_within_window_return_previous_rate() {
        let start = Instant::now();
        let mut est = ThroughputEstimator::starting_at(start);

        let rate = est.sample_at(2_000_000, start + Duration::from_secs(1));
        assert_eq!(rate, 2_000_000);

        // 10ms later: too soon, the window has not advanced.
        let rate = est.sample_at(2_100_000, start + Duration::from_secs(1) + MIN_WINDOW / 10);
        assert_eq!(rate, 2_000_000);
    }

    #[test]
    fn test_stalled_transfer_decays_to_zero() {
        let start = Instant::now();
        let mut est = ThroughputEstimator::starting_at(start);

        est.sample_at(1_000_000, start + Duration::from_secs(1));
        let rate = est.sample_at(1_000_000, start + Duration::from_secs(3));
        assert_eq!(rate, 0);
    }
}
