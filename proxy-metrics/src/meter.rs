//! Rate meters.
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use quanta::{Clock, Instant};

/// Interval at which the moving averages are folded forward.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// An exponentially-weighted moving average of a per-second rate.
#[derive(Clone, Debug)]
struct Ewma {
    alpha: f64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn with_minutes(minutes: f64) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp();
        Self { alpha, rate: 0.0, initialized: false }
    }

    fn tick(&mut self, uncounted: u64) {
        let instant_rate = uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    // Equivalent to calling `tick(0)` `ticks` times.
    fn decay(&mut self, ticks: u64) {
        if ticks == 0 {
            return;
        }
        if !self.initialized {
            self.initialized = true;
        }
        let exponent = i32::try_from(ticks).unwrap_or(i32::MAX);
        self.rate *= (1.0 - self.alpha).powi(exponent);
    }
}

#[derive(Debug)]
struct Averages {
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

/// Tracks how often events occur.
///
/// Exposes the all-time mean rate plus 1, 5 and 15-minute exponentially-weighted moving averages, all
/// in events per second.  The averages advance in fixed [`TICK_INTERVAL`] steps.  Rather than relying
/// on a background ticker, pending ticks are applied lazily whenever the meter is marked or read.
pub struct Meter {
    clock: Clock,
    start: Instant,
    count: AtomicU64,
    uncounted: AtomicU64,
    averages: Mutex<Averages>,
}

impl Meter {
    /// Creates a new `Meter` using the given clock.
    pub fn new(clock: Clock) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            count: AtomicU64::new(0),
            uncounted: AtomicU64::new(0),
            averages: Mutex::new(Averages {
                last_tick: start,
                m1: Ewma::with_minutes(1.0),
                m5: Ewma::with_minutes(5.0),
                m15: Ewma::with_minutes(15.0),
            }),
        }
    }

    /// Records `n` events.
    pub fn mark(&self, n: u64) {
        self.tick_if_necessary();
        self.count.fetch_add(n, Ordering::Relaxed);
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    /// Gets the number of events recorded since creation.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Gets the one-minute moving average rate.
    pub fn rate1(&self) -> f64 {
        self.tick_if_necessary();
        self.averages.lock().m1.rate
    }

    /// Gets the five-minute moving average rate.
    pub fn rate5(&self) -> f64 {
        self.tick_if_necessary();
        self.averages.lock().m5.rate
    }

    /// Gets the fifteen-minute moving average rate.
    pub fn rate15(&self) -> f64 {
        self.tick_if_necessary();
        self.averages.lock().m15.rate
    }

    /// Gets the mean rate since creation.
    pub fn rate_mean(&self) -> f64 {
        let elapsed = self.clock.now().saturating_duration_since(self.start).as_secs_f64();
        if elapsed > 0.0 {
            self.count() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Gets all four rates at once, as `(1m, 5m, 15m, mean)`.
    pub fn rates(&self) -> (f64, f64, f64, f64) {
        self.tick_if_necessary();
        let averages = self.averages.lock();
        (averages.m1.rate, averages.m5.rate, averages.m15.rate, self.rate_mean())
    }

    fn tick_if_necessary(&self) {
        let now = self.clock.now();
        let mut averages = self.averages.lock();
        let elapsed = now.saturating_duration_since(averages.last_tick);
        if elapsed < TICK_INTERVAL {
            return;
        }

        let ticks = (elapsed.as_nanos() / TICK_INTERVAL.as_nanos()) as u64;
        let averages = &mut *averages;
        averages.last_tick += TICK_INTERVAL * u32::try_from(ticks).unwrap_or(u32::MAX);

        // Everything marked since the last tick lands in the first pending tick, the rest are idle.
        let uncounted = self.uncounted.swap(0, Ordering::Relaxed);
        for ewma in [&mut averages.m1, &mut averages.m5, &mut averages.m15] {
            ewma.tick(uncounted);
            ewma.decay(ticks - 1);
        }
    }
}
