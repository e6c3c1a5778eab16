use std::collections::VecDeque;

use super::clock::{Clock, SystemClock};
use super::ConfigError;

/// Estimates how often events arrive from the mean of the most recent
/// inter-arrival gaps.
///
/// Keeps at most `window_size - 1` gaps. A timestamp earlier than the start
/// of the current epoch (wall clock jumped back) discards everything and
/// starts over.
#[derive(Debug)]
pub struct RateMonitor<C: Clock = SystemClock> {
    clock: C,
    window_size: usize,
    gaps: VecDeque<f64>,
    t0: Option<f64>,
    t_last: f64,
    last_emitted_t: Option<f64>,
    last_rate: f64,
}

impl RateMonitor<SystemClock> {
    pub fn new(window_size: usize) -> Result<Self, ConfigError> {
        Self::with_clock(window_size, SystemClock)
    }
}

impl<C: Clock> RateMonitor<C> {
    pub fn with_clock(window_size: usize, clock: C) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::ZeroWindow { what: "rate monitor" });
        }
        Ok(Self {
            clock,
            window_size,
            gaps: VecDeque::with_capacity(window_size),
            t0: None,
            t_last: 0.0,
            last_emitted_t: None,
            last_rate: 0.0,
        })
    }

    /// Record one event at the clock's current time.
    pub fn count(&mut self) {
        let now = self.clock.now();
        self.count_at(now);
    }

    pub fn count_at(&mut self, now: f64) {
        match self.t0 {
            Some(t0) if now >= t0 => {
                self.gaps.push_back(now - self.t_last);
                self.t_last = now;
            }
            _ => {
                self.t0 = Some(now);
                self.t_last = now;
                self.gaps.clear();
            }
        }

        while self.gaps.len() > self.window_size - 1 {
            self.gaps.pop_front();
        }
    }

    /// Events per second. With `use_cached` the last computed value is
    /// returned as is; otherwise the rate is recomputed and reads 0 when
    /// nothing arrived since the previous computation.
    pub fn get_rate(&mut self, use_cached: bool) -> f64 {
        if use_cached {
            return self.last_rate;
        }
        let rate = if self.gaps.is_empty() || self.last_emitted_t == Some(self.t_last) {
            0.0
        } else {
            let mean = self.gaps.iter().sum::<f64>() / self.gaps.len() as f64;
            self.last_emitted_t = Some(self.t_last);
            if mean > 0.0 {
                1.0 / mean
            } else {
                0.0
            }
        };
        self.last_rate = rate;
        rate
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of inter-arrival gaps currently retained.
    pub fn retained(&self) -> usize {
        self.gaps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::clock::ManualClock;

    fn monitor(window: usize) -> (RateMonitor<ManualClock>, ManualClock) {
        let clock = ManualClock::new(100.0);
        (RateMonitor::with_clock(window, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = RateMonitor::new(0).unwrap_err();
        assert_eq!(err, ConfigError::ZeroWindow { what: "rate monitor" });
    }

    #[test]
    fn retains_at_most_window_minus_one_gaps() {
        let (mut m, clock) = monitor(5);
        for _ in 0..20 {
            m.count();
            clock.advance(0.1);
            assert!(m.retained() <= 4);
        }
        assert_eq!(m.retained(), 4);
    }

    #[test]
    fn evicts_oldest_gap_first() {
        let (mut m, _) = monitor(3);
        // gaps: 1.0, 2.0, then 0.5 pushes out the 1.0
        for t in [0.0, 1.0, 3.0, 3.5] {
            m.count_at(t);
        }
        assert_eq!(m.retained(), 2);
        // mean of [2.0, 0.5] = 1.25
        assert!((m.get_rate(false) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn constant_gap_gives_reciprocal_rate() {
        let (mut m, clock) = monitor(10);
        for _ in 0..10 {
            m.count();
            clock.advance(0.02);
        }
        assert!((m.get_rate(false) - 50.0).abs() < 1e-6);
    }

    #[test]
    fn empty_monitor_reads_zero() {
        let (mut m, _) = monitor(10);
        assert_eq!(m.get_rate(false), 0.0);
        // first event only starts the epoch
        m.count();
        assert_eq!(m.get_rate(false), 0.0);
    }

    #[test]
    fn second_read_without_new_data_is_zero_but_cache_keeps_value() {
        let (mut m, _) = monitor(10);
        m.count_at(1.0);
        m.count_at(1.5);
        assert!((m.get_rate(false) - 2.0).abs() < 1e-9);
        assert!((m.get_rate(true) - 2.0).abs() < 1e-9);
        assert_eq!(m.get_rate(false), 0.0);
        // the zero read is now what the cache holds
        assert_eq!(m.get_rate(true), 0.0);
        m.count_at(2.0);
        assert!((m.get_rate(false) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn cached_read_does_not_consume_new_data() {
        let (mut m, _) = monitor(10);
        m.count_at(1.0);
        m.count_at(1.25);
        assert_eq!(m.get_rate(true), 0.0);
        assert!((m.get_rate(false) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn identical_timestamps_do_not_divide_by_zero() {
        let (mut m, _) = monitor(10);
        for _ in 0..5 {
            m.count_at(7.0);
        }
        let r = m.get_rate(false);
        assert_eq!(r, 0.0);
        assert!(r.is_finite());
    }

    #[test]
    fn clock_regression_starts_new_epoch() {
        let (mut m, _) = monitor(10);
        for t in [50.0, 50.1, 50.2, 50.3] {
            m.count_at(t);
        }
        assert_eq!(m.retained(), 3);

        m.count_at(10.0);
        assert_eq!(m.retained(), 0);
        assert_eq!(m.get_rate(false), 0.0);

        m.count_at(10.5);
        assert_eq!(m.retained(), 1);
        assert!((m.get_rate(false) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn window_of_one_keeps_no_gaps() {
        let (mut m, _) = monitor(1);
        m.count_at(1.0);
        m.count_at(2.0);
        assert_eq!(m.retained(), 0);
        assert_eq!(m.get_rate(false), 0.0);
    }
}
