use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::notify::{Subscribers, Subscription};
use crate::timer::Ticker;

/// Length of the trailing window the sum is reported over.
pub const TRAILING_WINDOW_SECS: f64 = 1.0;

const SUBSCRIBER_CAPACITY: usize = 64;

struct Inner<C> {
    clock: C,
    events: VecDeque<(f64, u64)>,
    sum: u64,
    poll_hz: i32,
    running: bool,
    // disabled by a rate <= 0; a later positive rate resumes polling
    soft_stopped: bool,
    subscribers: Subscribers<u64>,
}

impl<C: Clock> Inner<C> {
    fn poll_at(&mut self, now: f64) -> u64 {
        let cutoff = now - TRAILING_WINDOW_SECS;
        while let Some(&(t, size)) = self.events.front() {
            if t >= cutoff {
                break;
            }
            self.sum -= size;
            self.events.pop_front();
        }
        self.subscribers.broadcast(self.sum);
        self.sum
    }

    fn clear(&mut self) {
        self.events.clear();
        self.sum = 0;
    }
}

/// Bytes per second over the trailing second, published at a configurable
/// cadence.
///
/// Payload sizes are pushed with [`count`](Self::count); a background ticker
/// calls [`poll`](Self::poll) `poll_hz` times per second and every poll is
/// broadcast to the receivers handed out by [`subscribe`](Self::subscribe).
pub struct ThroughputMonitor<C: Clock + 'static = SystemClock> {
    inner: Arc<Mutex<Inner<C>>>,
    ticker: Ticker,
}

impl ThroughputMonitor<SystemClock> {
    pub fn new(name: &str) -> std::io::Result<Self> {
        Self::with_clock(name, SystemClock)
    }
}

impl<C: Clock + 'static> ThroughputMonitor<C> {
    pub fn with_clock(name: &str, clock: C) -> std::io::Result<Self> {
        let inner = Arc::new(Mutex::new(Inner {
            clock,
            events: VecDeque::new(),
            sum: 0,
            poll_hz: 0,
            running: false,
            soft_stopped: false,
            subscribers: Subscribers::new(),
        }));

        let inner_for_tick = Arc::clone(&inner);
        let ticker = Ticker::spawn(&format!("poll-{name}"), Duration::from_secs(1), move || {
            let mut inner = inner_for_tick.lock().unwrap_or_else(PoisonError::into_inner);
            // a stop() that won the lock before this tick has the final word
            if !inner.running {
                return;
            }
            let now = inner.clock.now();
            inner.poll_at(now);
        })?;

        Ok(Self { inner, ticker })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the poll cadence. `hz <= 0` stops polling, clears all state and
    /// publishes 0; a later positive rate resumes polling on its own.
    pub fn set_rate(&self, hz: i32) {
        let mut inner = self.lock();
        inner.poll_hz = hz;
        if hz <= 0 {
            self.stop_locked(&mut inner);
            inner.soft_stopped = true;
            debug!(hz, "Throughput polling disabled");
        } else {
            self.ticker.set_interval(Duration::from_millis((1000 / hz) as u64));
            if inner.soft_stopped {
                self.start_locked(&mut inner);
            }
            debug!(hz, "Throughput poll rate set");
        }
    }

    /// Resume polling. Without a positive rate this only marks the monitor
    /// to resume once one is set.
    pub fn start(&self) {
        let mut inner = self.lock();
        self.start_locked(&mut inner);
    }

    /// Stop polling, drop all retained events and publish 0. No poll result
    /// is published after this returns.
    pub fn stop(&self) {
        let mut inner = self.lock();
        self.stop_locked(&mut inner);
    }

    fn start_locked(&self, inner: &mut Inner<C>) {
        if inner.poll_hz > 0 {
            inner.running = true;
            inner.soft_stopped = false;
            self.ticker.start();
        } else {
            inner.soft_stopped = true;
        }
    }

    fn stop_locked(&self, inner: &mut Inner<C>) {
        inner.running = false;
        inner.soft_stopped = false;
        self.ticker.stop();
        inner.clear();
        inner.subscribers.broadcast(0);
    }

    /// Record a payload of `size` bytes seen now.
    pub fn count(&self, size: u64) {
        let mut inner = self.lock();
        let now = inner.clock.now();
        Self::count_locked(&mut inner, now, size);
    }

    pub fn count_at(&self, now: f64, size: u64) {
        let mut inner = self.lock();
        Self::count_locked(&mut inner, now, size);
    }

    fn count_locked(inner: &mut Inner<C>, now: f64, size: u64) {
        inner.events.push_back((now, size));
        inner.sum += size;
    }

    /// Evict everything older than one second, publish and return the sum
    /// of what is left.
    pub fn poll(&self) -> u64 {
        let mut inner = self.lock();
        let now = inner.clock.now();
        inner.poll_at(now)
    }

    pub fn poll_at(&self, now: f64) -> u64 {
        self.lock().poll_at(now)
    }

    pub fn subscribe(&self) -> Subscription<u64> {
        self.lock().subscribers.subscribe(SUBSCRIBER_CAPACITY)
    }

    pub fn poll_hz(&self) -> i32 {
        self.lock().poll_hz
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn is_soft_stopped(&self) -> bool {
        self.lock().soft_stopped
    }

    pub fn retained(&self) -> usize {
        self.lock().events.len()
    }
}
