//! Sampled histograms.
use parking_lot::Mutex;

use crate::reservoir::UniformReservoir;

/// Quantiles reported for every histogram and timer: median, 75%, 95%, 99% and 99.9%.
pub const REPORTED_QUANTILES: [f64; 5] = [0.5, 0.75, 0.95, 0.99, 0.999];

#[derive(Clone, Copy, Debug, Default)]
struct Moments {
    count: u64,
    min: i64,
    max: i64,
    mean: f64,
    // Sum of squared differences from the mean (Welford).
    m2: f64,
}

impl Moments {
    fn update(&mut self, value: i64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.count += 1;
        let delta = value as f64 - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value as f64 - self.mean);
    }

    fn stddev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

/// A histogram of integer samples.
///
/// Count, minimum, maximum, mean and standard deviation are exact and cover every recorded value.
/// Percentiles are estimated from a [`UniformReservoir`] of fixed size.
pub struct Histogram {
    moments: Mutex<Moments>,
    reservoir: UniformReservoir,
}

impl Histogram {
    /// Creates a new `Histogram` backed by a reservoir holding up to `reservoir_size` samples.
    pub fn new(reservoir_size: usize) -> Self {
        Self {
            moments: Mutex::new(Moments::default()),
            reservoir: UniformReservoir::new(reservoir_size),
        }
    }

    /// Records a value.
    pub fn update(&self, value: i64) {
        // The reservoir is written under the same lock so that a snapshot never sees a claimed
        // but unwritten slot, nor a sample that its moments do not cover.
        let mut moments = self.moments.lock();
        moments.update(value);
        self.reservoir.push(value);
    }

    /// Gets the number of values recorded since creation.
    pub fn count(&self) -> u64 {
        self.moments.lock().count
    }

    /// Takes a point-in-time snapshot of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let (moments, mut sample) = {
            let moments = self.moments.lock();
            (*moments, self.reservoir.values())
        };
        sample.sort_unstable();

        HistogramSnapshot {
            count: moments.count,
            min: moments.min,
            max: moments.max,
            mean: moments.mean,
            stddev: moments.stddev(),
            sample,
        }
    }
}

/// A read-only copy of a [`Histogram`].
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSnapshot {
    count: u64,
    min: i64,
    max: i64,
    mean: f64,
    stddev: f64,
    sample: Vec<i64>,
}

impl HistogramSnapshot {
    /// Gets the number of recorded values.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Gets the smallest recorded value, or zero if empty.
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Gets the largest recorded value, or zero if empty.
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Gets the arithmetic mean, or zero if empty.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Gets the population standard deviation, or zero if empty.
    pub fn stddev(&self) -> f64 {
        self.stddev
    }

    /// Gets the reservoir sample, sorted ascending.
    pub fn sample(&self) -> &[i64] {
        &self.sample
    }

    /// Estimates the value at quantile `q` from the reservoir sample.
    ///
    /// The position of the quantile is `q * (n + 1)`.  Positions before the first sample clamp to
    /// the smallest sample, positions at or past the last one clamp to the largest, and anything in
    /// between is linearly interpolated from its two neighbours.  An empty sample yields zero.
    pub fn percentile(&self, q: f64) -> f64 {
        let n = self.sample.len();
        if n == 0 {
            return 0.0;
        }

        let pos = q * (n as f64 + 1.0);
        if pos < 1.0 {
            self.sample[0] as f64
        } else if pos >= n as f64 {
            self.sample[n - 1] as f64
        } else {
            let lower = self.sample[pos as usize - 1] as f64;
            let upper = self.sample[pos as usize] as f64;
            lower + (pos - pos.floor()) * (upper - lower)
        }
    }

    /// Estimates the values at each of the given quantiles.
    pub fn percentiles(&self, quantiles: &[f64]) -> Vec<f64> {
        quantiles.iter().map(|q| self.percentile(*q)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
    };

    use approx::assert_relative_eq;

    use super::{Histogram, REPORTED_QUANTILES};

    #[test]
    fn test_empty_snapshot() {
        let histogram = Histogram::new(16);
        let snapshot = histogram.snapshot();

        assert_eq!(snapshot.count(), 0);
        assert_eq!(snapshot.min(), 0);
        assert_eq!(snapshot.max(), 0);
        assert_eq!(snapshot.mean(), 0.0);
        assert_eq!(snapshot.stddev(), 0.0);
        assert_eq!(snapshot.percentiles(&REPORTED_QUANTILES), vec![0.0; 5]);
    }

    #[test]
    fn test_moments() {
        let histogram = Histogram::new(16);
        for value in [2, 4, 4, 4, 5, 5, 7, 9] {
            histogram.update(value);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 8);
        assert_eq!(snapshot.min(), 2);
        assert_eq!(snapshot.max(), 9);
        assert_relative_eq!(snapshot.mean(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(snapshot.stddev(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_percentiles() {
        let histogram = Histogram::new(1024);
        for value in (1..=100).rev() {
            histogram.update(value);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.sample().first(), Some(&1));
        assert_eq!(snapshot.sample().last(), Some(&100));

        let ps = snapshot.percentiles(&REPORTED_QUANTILES);
        assert_relative_eq!(ps[0], 50.5, epsilon = 1e-9);
        assert_relative_eq!(ps[1], 75.75, epsilon = 1e-9);
        assert_relative_eq!(ps[2], 95.95, epsilon = 1e-9);
        assert_relative_eq!(ps[3], 99.99, epsilon = 1e-9);
        assert_relative_eq!(ps[4], 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_percentiles_small_sample() {
        let histogram = Histogram::new(1024);
        for value in [30, 10, 20] {
            histogram.update(value);
        }

        let snapshot = histogram.snapshot();
        assert_relative_eq!(snapshot.percentile(0.5), 20.0, epsilon = 1e-9);
        assert_relative_eq!(snapshot.percentile(0.1), 10.0, epsilon = 1e-9);
        assert_relative_eq!(snapshot.percentile(0.999), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_moments_cover_values_outside_the_sample() {
        let histogram = Histogram::new(4);
        for value in 0..1000 {
            histogram.update(value);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 1000);
        assert_eq!(snapshot.min(), 0);
        assert_eq!(snapshot.max(), 999);
        assert_eq!(snapshot.sample().len(), 4);
    }

    #[test]
    fn test_concurrent_snapshots_stay_within_bounds() {
        let histogram = Arc::new(Histogram::new(64));
        let done = Arc::new(AtomicBool::new(false));

        let writers = (0..4)
            .map(|id| {
                let histogram = Arc::clone(&histogram);
                thread::spawn(move || {
                    for i in 0..20_000 {
                        histogram.update(1_000 + id * 20_000 + i);
                    }
                })
            })
            .collect::<Vec<_>>();

        let reader = {
            let histogram = Arc::clone(&histogram);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let snapshot = histogram.snapshot();
                    if snapshot.count() == 0 {
                        continue;
                    }

                    assert!(snapshot.sample().len() as u64 <= snapshot.count());
                    for value in snapshot.sample() {
                        assert!(
                            (snapshot.min()..=snapshot.max()).contains(value),
                            "{} outside of [{}, {}]",
                            value,
                            snapshot.min(),
                            snapshot.max()
                        );
                    }
                    assert!(snapshot.percentile(0.001) >= snapshot.min() as f64);
                }
            })
        };

        for writer in writers {
            writer.join().expect("writer panicked");
        }
        done.store(true, Ordering::Release);
        reader.join().expect("reader panicked");

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 80_000);
        assert_eq!(snapshot.min(), 1_000);
        assert_eq!(snapshot.sample().len(), 64);
    }
}
