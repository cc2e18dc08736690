//! A uniform sampling reservoir.

use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicU64, Ordering::Relaxed},
};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Default number of samples kept per histogram.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1024;

thread_local! {
    static FAST_RNG: UnsafeCell<Xoshiro256StarStar> = {
        UnsafeCell::new(Xoshiro256StarStar::from_rng(&mut rand::rng()))
    };
}

fn fastrand(upper: u64) -> u64 {
    FAST_RNG.with(|rng| {
        // SAFETY: We know it's safe to take a mutable reference since we're getting a pointer to a thread-local value,
        // and the reference never outlives the closure executing on this thread.
        let rng = unsafe { &mut *rng.get() };
        rng.random_range(0..upper)
    })
}

/// A fixed-size, uniformly sampled reservoir of integer values.
///
/// [Reservoir sampling][rs] keeps a statistically representative sample of a stream in fixed space
/// without knowing the length of the stream in advance, following Vitter's
/// ["Algorithm R"][vitter_paper]: the first `size` values are stored as-is, and every value after
/// that replaces a random slot with probability `size / seen`.
///
/// Writers never block each other.  Slots are individual atomics, so a reader racing a writer may
/// observe a slot that has been claimed but not yet written; such a slot reads as the value that
/// was there before (zero for a reservoir that has not filled up yet).  Callers that need a sample
/// consistent with other state, like [`Histogram`](crate::Histogram), serialize pushes and reads
/// under their own lock.
///
/// [rs]: https://en.wikipedia.org/wiki/Reservoir_sampling
/// [vitter_paper]: https://www.cs.umd.edu/~samir/498/vitter.pdf
pub struct UniformReservoir {
    values: Box<[AtomicU64]>,
    seen: AtomicU64,
}

impl UniformReservoir {
    /// Creates a new `UniformReservoir` that stores up to `size` samples.
    ///
    /// A `size` of zero is bumped to one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let mut values = Vec::with_capacity(size);
        for _ in 0..size {
            values.push(AtomicU64::new(0));
        }

        Self { values: values.into_boxed_slice(), seen: AtomicU64::new(0) }
    }

    /// Gets the maximum number of samples this reservoir holds.
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Gets the number of values pushed into the reservoir since creation.
    pub fn seen(&self) -> u64 {
        self.seen.load(Relaxed)
    }

    /// Gets the number of samples currently held.
    pub fn len(&self) -> usize {
        let seen = self.seen();
        if seen < self.values.len() as u64 {
            seen as usize
        } else {
            self.values.len()
        }
    }

    /// Returns `true` if nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.seen() == 0
    }

    /// Pushes a value into the reservoir.
    pub fn push(&self, value: i64) {
        let idx = self.seen.fetch_add(1, Relaxed);
        let capacity = self.values.len() as u64;
        if idx < capacity {
            self.values[idx as usize].store(value as u64, Relaxed);
        } else {
            let maybe_idx = fastrand(idx + 1);
            if maybe_idx < capacity {
                self.values[maybe_idx as usize].store(value as u64, Relaxed);
            }
        }
    }

    /// Copies out the samples currently held.
    pub fn values(&self) -> Vec<i64> {
        self.values[..self.len()].iter().map(|v| v.load(Relaxed) as i64).collect()
    }
}
