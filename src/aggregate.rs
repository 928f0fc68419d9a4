//! Local aggregation of counters and measures.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use statsum_types::protocol::{CounterEntry, MeasureEntry, Payload};

/// The aggregates of one flush period.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Snapshot {
    counters: HashMap<String, i64>,
    measures: HashMap<String, Vec<f64>>,
    data_points: usize,
}

impl Snapshot {
    /// The counter totals by name.
    pub fn counters(&self) -> &HashMap<String, i64> {
        &self.counters
    }

    /// The measure observations by name.
    pub fn measures(&self) -> &HashMap<String, Vec<f64>> {
        &self.measures
    }

    /// The number of data points: one per counter series plus one per
    /// measure observation.
    pub fn data_points(&self) -> usize {
        self.data_points
    }

    /// The number of distinct series.
    pub fn dimensionality(&self) -> usize {
        self.counters.len() + self.measures.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.measures.is_empty()
    }

    fn merge_counter(&mut self, name: String, delta: i64) {
        match self.counters.entry(name) {
            Entry::Occupied(mut e) => {
                let total = e.get_mut();
                *total = total.saturating_add(delta);
            }
            Entry::Vacant(e) => {
                // a counter series is a single data point no matter how often
                // it is incremented
                self.data_points += 1;
                e.insert(delta);
            }
        }
    }

    fn merge_measure(&mut self, name: String, value: f64) {
        self.data_points += 1;
        self.measures.entry(name).or_default().push(value);
    }
}

impl From<Snapshot> for Payload {
    fn from(snapshot: Snapshot) -> Self {
        Payload {
            counters: snapshot
                .counters
                .into_iter()
                .map(|(name, value)| CounterEntry { name, value })
                .collect(),
            measures: snapshot
                .measures
                .into_iter()
                .map(|(name, values)| MeasureEntry { name, values })
                .collect(),
        }
    }
}

/// Holds the open flush period.
///
/// All mutation goes through one mutex, and [`take_snapshot`] swaps the
/// open period for an empty one under that mutex, so every write lands in
/// exactly one snapshot.
///
/// [`take_snapshot`]: AggregateStore::take_snapshot
#[derive(Debug, Default)]
pub struct AggregateStore {
    epoch: Mutex<Snapshot>,
}

impl AggregateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `delta` to the counter `name`.
    ///
    /// Totals saturate at the bounds of `i64`.
    pub fn merge_counter(&self, name: String, delta: i64) -> usize {
        self.merge_counters(std::iter::once(name), delta)
    }

    /// Adds `delta` to every counter in `names` and returns the data points
    /// of the open period afterwards.
    pub fn merge_counters<I>(&self, names: I, delta: i64) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut epoch = self.lock();
        for name in names {
            epoch.merge_counter(name, delta);
        }
        epoch.data_points
    }

    /// Appends `value` to the measure `name`.
    pub fn merge_measure(&self, name: String, value: f64) -> usize {
        self.merge_measures(std::iter::once(name), value)
    }

    /// Appends `value` to every measure in `names` and returns the data points
    /// of the open period afterwards.
    pub fn merge_measures<I>(&self, names: I, value: f64) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut epoch = self.lock();
        for name in names {
            epoch.merge_measure(name, value);
        }
        epoch.data_points
    }

    /// The data points recorded in the open period.
    pub fn data_points(&self) -> usize {
        self.lock().data_points
    }

    /// Takes the open period and replaces it with an empty one.
    pub fn take_snapshot(&self) -> Snapshot {
        std::mem::take(&mut *self.lock())
    }
}
