//! Asynchronous application of metric updates.
//!
//! Callers on the serving path only ever enqueue an update; a small pool of worker threads
//! resolves the metric in the registry and applies the update.  The queue is bounded: when it is
//! full, or when no worker could be started, updates are dropped and counted rather than blocking
//! the caller.
use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use crossbeam_utils::Backoff;
use tracing::{debug, trace, warn};

use crate::{
    error::UpdateError,
    kind::MetricKind,
    metric::Metric,
    registry::Registry,
    storage::Storage,
};

/// A pending change to a single metric.
#[derive(Debug)]
pub(crate) enum Update {
    Timer { name: String, elapsed: Duration },
    Counter { name: String, value: u64 },
}

/// The registry along with the storage used to populate it.
pub(crate) struct State {
    pub(crate) registry: Registry,
    pub(crate) storage: Box<dyn Storage>,
}

impl State {
    pub(crate) fn apply(&self, update: Update) -> Result<(), UpdateError> {
        match update {
            Update::Timer { name, elapsed } => {
                match self.registry.get_or_register(&name, || self.storage.timer()) {
                    Metric::Timer(timer) => timer.update(elapsed),
                    Metric::Void => {}
                    other => return Err(mismatch(name, MetricKind::Timer, &other)),
                }
            }
            Update::Counter { name, value } => {
                match self.registry.get_or_register(&name, || self.storage.counter()) {
                    Metric::Counter(counter) => counter.increment(value),
                    Metric::Void => {}
                    other => return Err(mismatch(name, MetricKind::Counter, &other)),
                }
            }
        }

        Ok(())
    }
}

fn mismatch(name: String, expected: MetricKind, found: &Metric) -> UpdateError {
    UpdateError::KindMismatch { name, expected, found: found.kind() }
}

pub(crate) struct Updater {
    sender: Sender<Update>,
    pending: Arc<AtomicUsize>,
    dropped: AtomicU64,
}

impl Updater {
    /// Starts `workers` threads draining a queue of `capacity` updates into `state`.
    ///
    /// Failing to start a worker is not an error: the updater keeps going with whatever workers it
    /// got, and drops every update if it got none.
    pub(crate) fn spawn(state: Arc<State>, capacity: usize, workers: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));

        let mut started = 0;
        for id in 0..workers.max(1) {
            let receiver = receiver.clone();
            let state = Arc::clone(&state);
            let pending = Arc::clone(&pending);
            let result = thread::Builder::new()
                .name(format!("proxy-metrics-updater-{}", id))
                .spawn(move || run_worker(receiver, state, pending));

            match result {
                Ok(_) => started += 1,
                Err(e) => warn!(error = %e, "failed to start metric update worker"),
            }
        }
        debug!(workers = started, capacity, "started metric update workers");

        Self { sender, pending, dropped: AtomicU64::new(0) }
    }

    /// Enqueues an update without ever blocking.
    pub(crate) fn submit(&self, update: Update) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.sender.try_send(update) {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(update) => trace!(?update, "update queue full, dropping update"),
                TrySendError::Disconnected(update) => {
                    trace!(?update, "no update workers running, dropping update")
                }
            }
        }
    }

    /// Blocks until no update is waiting to be applied.
    pub(crate) fn flush(&self) {
        let backoff = Backoff::new();
        while self.pending.load(Ordering::Acquire) > 0 {
            if backoff.is_completed() {
                thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn run_worker(receiver: Receiver<Update>, state: Arc<State>, pending: Arc<AtomicUsize>) {
    for update in receiver.iter() {
        if let Err(e) = state.apply(update) {
            warn!(error = %e, "failed to apply metric update");
        }
        pending.fetch_sub(1, Ordering::AcqRel);
    }
    debug!("metric update worker stopped");
}
