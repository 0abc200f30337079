//! Per-epoch metric history.
//!
//! A [`History`] holds two append-only streams of metric records, one for training and one
//! for validation. The training loop appends one record per finished epoch; callbacks only
//! read it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric name to value for a single epoch, e.g. `{"accuracy": 0.91, "loss": 0.23}`.
pub type Metrics = BTreeMap<String, f64>;

/// Which half of the history a monitor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Train,
    Validate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    train: Vec<Metrics>,
    validate: Vec<Metrics>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stream: Stream, metrics: Metrics) {
        match stream {
            Stream::Train => self.train.push(metrics),
            Stream::Validate => self.validate.push(metrics),
        }
    }

    pub fn stream(&self, stream: Stream) -> &[Metrics] {
        match stream {
            Stream::Train => &self.train,
            Stream::Validate => &self.validate,
        }
    }

    /// The most recent record of `stream`, if any epoch has been recorded.
    pub fn latest(&self, stream: Stream) -> Option<&Metrics> {
        self.stream(stream).last()
    }

    pub fn train(&self) -> &[Metrics] {
        &self.train
    }

    pub fn validate(&self) -> &[Metrics] {
        &self.validate
    }
}

/// Builds a [`Metrics`] record from `(name, value)` pairs.
pub fn metrics<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Metrics {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
