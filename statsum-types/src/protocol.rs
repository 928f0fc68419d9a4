//! The types submitted to and returned by a statsum collector.
//!
//! A submission is a single [`Payload`] holding every counter and measure that
//! was aggregated during one flush period.  Field names on the wire are kept
//! short (`k` for the metric name, `v` for the value) since payloads can hold
//! many thousands of entries.

use serde::{Deserialize, Serialize};

/// The path under a collector's base URL that submissions are posted to.
///
/// The project id is appended as the final path segment.
pub const SUBMISSION_PATH: [&str; 2] = ["v1", "project"];

/// An aggregated counter: the total of every increment for one metric name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CounterEntry {
    /// The canonical metric name.
    #[serde(rename = "k")]
    pub name: String,
    /// The accumulated total.
    #[serde(rename = "v")]
    pub value: i64,
}

impl CounterEntry {
    /// Creates a new counter entry.
    pub fn new<N: Into<String>>(name: N, value: i64) -> Self {
        CounterEntry {
            name: name.into(),
            value,
        }
    }
}

/// An aggregated measure: every observation for one metric name, in the order
/// they were recorded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeasureEntry {
    /// The canonical metric name.
    #[serde(rename = "k")]
    pub name: String,
    /// The observed values.
    #[serde(rename = "v")]
    pub values: Vec<f64>,
}

impl MeasureEntry {
    /// Creates a new measure entry.
    pub fn new<N: Into<String>>(name: N, values: Vec<f64>) -> Self {
        MeasureEntry {
            name: name.into(),
            values,
        }
    }
}

/// The body of a submission.
///
/// The order of entries carries no meaning.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// The aggregated counters.
    #[serde(default)]
    pub counters: Vec<CounterEntry>,
    /// The aggregated measures.
    #[serde(default)]
    pub measures: Vec<MeasureEntry>,
}

impl Payload {
    /// Returns `true` if the payload carries no entries at all.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.measures.is_empty()
    }

    /// The number of distinct series in the payload.
    pub fn dimensionality(&self) -> usize {
        self.counters.len() + self.measures.len()
    }

    /// Looks up a counter by name.
    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value)
    }

    /// Looks up the observations of a measure by name.
    pub fn measure(&self, name: &str) -> Option<&[f64]> {
        self.measures
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.values.as_slice())
    }
}

/// The structured body a collector sends when it permanently rejects a
/// submission.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    /// A machine readable error code.
    pub code: String,
    /// A human readable description.
    pub message: String,
}
