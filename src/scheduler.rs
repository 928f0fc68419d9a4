//! Deciding when the open period is flushed.
//!
//! The scheduler is idle until something is recorded, at which point it arms
//! a deadline a random delay in the future.  A background worker waits for
//! the deadline, takes the snapshot and hands it to the flush function.  If
//! the open period grows beyond the data point limit it is flushed right
//! away instead.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::aggregate::{AggregateStore, Snapshot};
use crate::jitter::JitterSource;
use crate::{statsum_debug, statsum_warn};

/// Called with every snapshot the scheduler flushes.
pub(crate) type FlushFn = Box<dyn Fn(Snapshot) + Send + 'static>;

/// When to flush.
#[derive(Clone)]
pub(crate) struct ScheduleSettings {
    pub max_data_points: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Arc<dyn JitterSource>,
}

impl fmt::Debug for ScheduleSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleSettings")
            .field("max_data_points", &self.max_data_points)
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct SchedulerState {
    /// `Some` while armed.
    deadline: Option<Instant>,
    /// Snapshots taken because of the data point limit, not yet sent.
    pending: VecDeque<Snapshot>,
    running: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SchedulerState>,
    wakeup: Condvar,
    store: Arc<AggregateStore>,
    settings: ScheduleSettings,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Job {
    Flush(Snapshot),
    Shutdown(Vec<Snapshot>),
}

/// Owns the flush worker of a store.
///
/// The scheduler lock is always taken before the store lock, and timer
/// expiry, manual flushes and threshold flushes all take their snapshot
/// while holding it.  A deadline that was cancelled can therefore never
/// fire into the following period.
#[derive(Debug)]
pub(crate) struct FlushScheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    pub fn new(
        store: Arc<AggregateStore>,
        settings: ScheduleSettings,
        flush: FlushFn,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState {
                deadline: None,
                pending: VecDeque::new(),
                running: true,
            }),
            wakeup: Condvar::new(),
            store,
            settings,
        });

        let worker = shared.clone();
        let handle = thread::Builder::new()
            .name("statsum-flush".into())
            .spawn(move || run(worker, flush))?;

        Ok(FlushScheduler {
            shared,
            handle: Some(handle),
        })
    }

    /// Reacts to data having been merged into the store.
    pub fn on_merge(&self) {
        let mut state = self.shared.lock();
        let data_points = self.shared.store.data_points();

        if data_points > self.shared.settings.max_data_points {
            statsum_debug!(
                "[FlushScheduler] {} data-points exceed the limit of {}, flushing",
                data_points,
                self.shared.settings.max_data_points
            );
            state.deadline = None;
            state.pending.push_back(self.shared.store.take_snapshot());
            self.shared.wakeup.notify_one();
        } else if state.deadline.is_none() && data_points > 0 {
            let settings = &self.shared.settings;
            let delay = settings
                .jitter
                .between(settings.min_delay, settings.max_delay);
            statsum_debug!("[FlushScheduler] Flushing in {:?}", delay);
            state.deadline = Some(Instant::now() + delay);
            self.shared.wakeup.notify_one();
        }
    }

    /// Cancels the deadline and takes everything not yet sent, oldest first.
    ///
    /// The last snapshot is the open period, which may be empty.
    pub fn take_all(&self) -> Vec<Snapshot> {
        let mut state = self.shared.lock();
        state.deadline = None;
        let mut snapshots: Vec<_> = state.pending.drain(..).collect();
        snapshots.push(self.shared.store.take_snapshot());
        snapshots
    }

    /// Returns `true` while a deadline is armed.
    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.shared.lock().running = false;
        self.shared.wakeup.notify_one();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn run(shared: Arc<Shared>, flush: FlushFn) {
    loop {
        match next_job(&shared) {
            Job::Flush(snapshot) => flush_catching_panics(&flush, snapshot),
            Job::Shutdown(snapshots) => {
                for snapshot in snapshots {
                    flush_catching_panics(&flush, snapshot);
                }
                return;
            }
        }
    }
}

/// A panicking flush loses its snapshot but must not stop the worker.
fn flush_catching_panics(flush: &FlushFn, snapshot: Snapshot) {
    let data_points = snapshot.data_points();
    if panic::catch_unwind(AssertUnwindSafe(|| flush(snapshot))).is_err() {
        statsum_warn!(
            "[FlushScheduler] flush panicked, dropped {} data-points",
            data_points
        );
    }
}

fn next_job(shared: &Shared) -> Job {
    let mut state = shared.lock();
    loop {
        if !state.running {
            let mut snapshots: Vec<_> = state.pending.drain(..).collect();
            let remaining = shared.store.take_snapshot();
            if !remaining.is_empty() {
                snapshots.push(remaining);
            }
            return Job::Shutdown(snapshots);
        }

        if let Some(snapshot) = state.pending.pop_front() {
            return Job::Flush(snapshot);
        }

        let deadline = state.deadline;
        state = match deadline {
            None => shared
                .wakeup
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    state.deadline = None;
                    return Job::Flush(shared.store.take_snapshot());
                }
                shared
                    .wakeup
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
    }
}
