//! Training lifecycle callbacks.
//!
//! A [`Callback`] hooks into the epoch loop driven by [`crate::training::fit`]. Every hook
//! has a no-op default so a callback implements only the ones it reacts to.
//!
//! Callbacks that watch a metric do so through a [`Monitor`]: `"val_acc"` reads
//! `accuracy` from the latest validation record and treats larger as better,
//! `"loss"` reads `loss` from the latest training record and treats smaller as better.
//!
//! > [!NOTE]
//! > A monitored metric that is missing from the latest record is not an error. The callback
//! > logs a warning and skips that epoch without touching its state.

pub mod checkpoint;
pub mod early_stopping;

pub use checkpoint::ModelCheckpoint;
pub use early_stopping::EarlyStopping;

use crate::history::{History, Stream};
use crate::training::{Model, Result};
use log::warn;
use std::fmt::Debug;

pub trait Callback: Debug {
    fn on_train_begin(&mut self, _model: &mut dyn Model, _history: &History) -> Result<()> {
        Ok(())
    }

    fn on_train_end(&mut self, _model: &mut dyn Model, _history: &History) -> Result<()> {
        Ok(())
    }

    fn on_epoch_begin(
        &mut self,
        _epoch: usize,
        _model: &mut dyn Model,
        _history: &History,
    ) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        _epoch: usize,
        _model: &mut dyn Model,
        _history: &History,
    ) -> Result<()> {
        Ok(())
    }

    fn on_train_batch_begin(&mut self, _batch: usize) -> Result<()> {
        Ok(())
    }

    fn on_train_batch_end(&mut self, _batch: usize) -> Result<()> {
        Ok(())
    }

    fn on_test_batch_begin(&mut self, _batch: usize) -> Result<()> {
        Ok(())
    }

    fn on_test_batch_end(&mut self, _batch: usize) -> Result<()> {
        Ok(())
    }
}

/// Whether a larger or a smaller metric is an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Min,
    Max,
}

impl Mode {
    /// Strict comparison; equal scores are not an improvement.
    pub fn improved(self, current: f64, best: f64) -> bool {
        match self {
            Mode::Min => current < best,
            Mode::Max => current > best,
        }
    }

    /// The best score before any epoch has run.
    pub fn initial_best(self) -> f64 {
        match self {
            Mode::Min => f64::INFINITY,
            Mode::Max => f64::NEG_INFINITY,
        }
    }
}

/// A metric watched by a callback, parsed from a name such as `"val_acc"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Monitor {
    name: String,
    stream: Stream,
    metric: String,
    mode: Mode,
}

impl Monitor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let stream = if name.starts_with("val") {
            Stream::Validate
        } else {
            Stream::Train
        };
        let metric = match name.rsplit('_').next() {
            Some("acc") => "accuracy".to_string(),
            Some(last) => last.to_string(),
            None => name.clone(),
        };
        let mode = if name.contains("acc") {
            Mode::Max
        } else {
            Mode::Min
        };

        Self {
            name,
            stream,
            metric,
            mode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Key looked up in a [`crate::history::Metrics`] record.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Reads the monitored value from the latest record of the monitored stream.
    ///
    /// Logs a warning naming `callback` and returns `None` when there is no record yet or
    /// the record lacks the metric.
    pub fn current(&self, history: &History, callback: &str) -> Option<f64> {
        let Some(latest) = history.latest(self.stream) else {
            warn!(
                "{} conditioned on metric {} but no {:?} metrics have been recorded",
                callback, self.name, self.stream
            );
            return None;
        };

        let score = latest.get(&self.metric).copied();
        if score.is_none() {
            warn!(
                "{} conditioned on metric {} which is not available. Available metrics are {:?}",
                callback,
                self.name,
                latest.keys().collect::<Vec<_>>()
            );
        }
        score
    }
}

/// Runs a sequence of callbacks, each hook in insertion order.
#[derive(Debug, Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: impl Callback + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn with(mut self, callback: impl Callback + 'static) -> Self {
        self.push(callback);
        self
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl Callback for CallbackList {
    fn on_train_begin(&mut self, model: &mut dyn Model, history: &History) -> Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_train_begin(&mut *model, history))
    }

    fn on_train_end(&mut self, model: &mut dyn Model, history: &History) -> Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_train_end(&mut *model, history))
    }

    fn on_epoch_begin(&mut self, epoch: usize, model: &mut dyn Model, history: &History) -> Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_epoch_begin(epoch, &mut *model, history))
    }

    fn on_epoch_end(&mut self, epoch: usize, model: &mut dyn Model, history: &History) -> Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_epoch_end(epoch, &mut *model, history))
    }

    fn on_train_batch_begin(&mut self, batch: usize) -> Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_train_batch_begin(batch))
    }

    fn on_train_batch_end(&mut self, batch: usize) -> Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_train_batch_end(batch))
    }

    fn on_test_batch_begin(&mut self, batch: usize) -> Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_test_batch_begin(batch))
    }

    fn on_test_batch_end(&mut self, batch: usize) -> Result<()> {
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_test_batch_end(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::metrics;

    #[test]
    fn test_monitor_parsing() {
        let val_acc = Monitor::new("val_acc");
        assert_eq!(val_acc.stream(), Stream::Validate);
        assert_eq!(val_acc.metric(), "accuracy");
        assert_eq!(val_acc.mode(), Mode::Max);

        let loss = Monitor::new("train_loss");
        assert_eq!(loss.stream(), Stream::Train);
        assert_eq!(loss.metric(), "loss");
        assert_eq!(loss.mode(), Mode::Min);

        // "val_accuracy" keeps its metric name but still maximises.
        let full = Monitor::new("val_accuracy");
        assert_eq!(full.metric(), "accuracy");
        assert_eq!(full.mode(), Mode::Max);
    }

    #[test]
    fn test_monitor_reads_latest_record() {
        let mut history = History::new();
        let monitor = Monitor::new("val_acc");
        assert_eq!(monitor.current(&history, "test"), None);

        history.record(Stream::Validate, metrics([("accuracy", 0.2)]));
        history.record(Stream::Validate, metrics([("accuracy", 0.7)]));
        assert_eq!(monitor.current(&history, "test"), Some(0.7));

        history.record(Stream::Validate, metrics([("loss", 0.1)]));
        assert_eq!(monitor.current(&history, "test"), None);
    }

    #[test]
    fn test_mode_comparisons() {
        assert!(Mode::Max.improved(0.5, Mode::Max.initial_best()));
        assert!(Mode::Min.improved(0.5, Mode::Min.initial_best()));
        assert!(!Mode::Max.improved(0.5, 0.5));
    }

    #[derive(Debug, Default)]
    struct Tally {
        batches: usize,
    }

    impl Callback for Tally {
        fn on_train_batch_end(&mut self, _batch: usize) -> Result<()> {
            self.batches += 1;
            Ok(())
        }
    }

    #[test]
    fn test_list_fans_out_batch_hooks() {
        let mut list = CallbackList::new().with(Tally::default()).with(Tally::default());
        assert_eq!(list.len(), 2);
        for batch in 0..3 {
            list.on_train_batch_begin(batch).unwrap();
            list.on_train_batch_end(batch).unwrap();
        }
        assert_eq!(format!("{:?}", list).matches("batches: 3").count(), 2);
    }
}
