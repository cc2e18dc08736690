//! Concurrent name-to-metric registry.
use std::{
    hash::BuildHasher,
    iter::repeat,
    sync::{PoisonError, RwLock},
    thread,
};

use hashbrown::{DefaultHashBuilder, HashMap};

use crate::metric::Metric;

/// A registry of metrics, keyed by name.
///
/// Names map to exactly one [`Metric`] for the lifetime of the registry: entries are created on first
/// access and are never replaced or removed.
///
/// ## Performance
///
/// `Registry` is optimized for reads.  Entries are spread across a power-of-two number of shards,
/// each behind its own lock, so lookups of existing names only ever take a shared lock on a single
/// shard.
pub struct Registry {
    shards: Vec<RwLock<HashMap<String, Metric>>>,
    shard_mask: usize,
    hasher: DefaultHashBuilder,
}

impl Registry {
    /// Creates a new `Registry` with one shard per available CPU, rounded up to a power of two.
    pub fn new() -> Self {
        let parallelism = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::with_shards(parallelism)
    }

    /// Creates a new `Registry` with at least `shard_count` shards.
    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = std::cmp::max(1, shard_count).next_power_of_two();
        let shards =
            repeat(()).take(shard_count).map(|_| RwLock::new(HashMap::new())).collect();

        Self { shards, shard_mask: shard_count - 1, hasher: DefaultHashBuilder::default() }
    }

    #[inline]
    fn shard_for(&self, name: &str) -> &RwLock<HashMap<String, Metric>> {
        let hash = self.hasher.hash_one(name);
        &self.shards[hash as usize & self.shard_mask]
    }

    /// Gets the metric registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Metric> {
        let shard = self.shard_for(name).read().unwrap_or_else(PoisonError::into_inner);
        shard.get(name).cloned()
    }

    /// Gets the metric registered under `name`, registering the result of `constructor` first if the
    /// name is not yet known.
    ///
    /// Concurrent callers racing on the same unseen name all observe the same instance.  The
    /// constructor runs under the shard's write lock, and only once a second lookup has confirmed that
    /// no other caller registered the name in the meantime, so it is invoked at most once per name.
    pub fn get_or_register<F>(&self, name: &str, constructor: F) -> Metric
    where
        F: FnOnce() -> Metric,
    {
        let shard = self.shard_for(name);

        // Try and get the metric if it exists.
        let shard_read = shard.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(metric) = shard_read.get(name) {
            return metric.clone();
        }

        // Switch to write guard and insert the metric first.
        drop(shard_read);
        let mut shard_write = shard.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(metric) = shard_write.get(name) {
            return metric.clone();
        }

        let metric = constructor();
        shard_write.insert(name.to_owned(), metric.clone());
        metric
    }

    /// Visits every metric stored in this registry.
    ///
    /// This operation does not lock the entire registry, but proceeds shard by shard.  A metric that
    /// is registered while the visit is in progress may or may not be observed.
    pub fn visit<F>(&self, mut collect: F)
    where
        F: FnMut(&str, &Metric),
    {
        for shard in self.shards.iter() {
            let shard_read = shard.read().unwrap_or_else(PoisonError::into_inner);
            for (name, metric) in shard_read.iter() {
                collect(name, metric);
            }
        }
    }

    /// Gets the number of registered names.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    };
    use std::thread;

    use super::Registry;
    use crate::{
        kind::MetricKind,
        metric::{Counter, Metric},
    };

    fn new_counter() -> Metric {
        Metric::Counter(Arc::new(Counter::new()))
    }

    #[test]
    fn test_registry() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(registry.get("foobar").is_none());

        let first = registry.get_or_register("foobar", new_counter);
        assert_eq!(registry.len(), 1);

        let second = registry.get_or_register("foobar", || panic!("constructor must not run"));
        assert!(first.ptr_eq(&second));

        let fetched = registry.get("foobar").expect("failed to get entry");
        assert!(first.ptr_eq(&fetched));

        registry.get_or_register("baz", || Metric::Void);
        assert_eq!(registry.len(), 2);

        let mut seen = Vec::new();
        registry.visit(|name, metric| seen.push((name.to_owned(), metric.kind())));
        seen.sort();
        assert_eq!(
            seen,
            vec![("baz".to_owned(), MetricKind::Void), ("foobar".to_owned(), MetricKind::Counter)]
        );
    }

    #[test]
    fn test_existing_entry_is_never_replaced() {
        let registry = Registry::with_shards(1);
        registry.get_or_register("name", new_counter);

        let metric = registry.get_or_register("name", || Metric::Void);
        assert_eq!(metric.kind(), MetricKind::Counter);
    }

    #[test]
    fn test_concurrent_first_access() {
        const THREADS: usize = 16;

        let registry = Arc::new(Registry::new());
        let constructed = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let constructed = Arc::clone(&constructed);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.get_or_register("unseen", || {
                        constructed.fetch_add(1, Ordering::SeqCst);
                        new_counter()
                    })
                })
            })
            .collect::<Vec<_>>();

        let metrics = handles
            .into_iter()
            .map(|h| h.join().expect("registry thread panicked"))
            .collect::<Vec<_>>();

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert!(metrics.iter().all(|m| m.ptr_eq(&metrics[0])));
    }

    #[test]
    fn test_shard_count_is_power_of_two() {
        assert_eq!(Registry::with_shards(0).shards.len(), 1);
        assert_eq!(Registry::with_shards(3).shards.len(), 4);
        assert_eq!(Registry::with_shards(8).shards.len(), 8);
    }
}
