//! Sequential training driver.
//!
//! [`fit`] owns the epoch loop. Each epoch it fires the callback hooks, runs a
//! caller-supplied closure that trains and evaluates the model, and records the metrics the
//! closure returns. The loop ends after `epochs` epochs or as soon as a callback sets the
//! model's stop flag.
//!
//! ```text
//! on_train_begin
//! for epoch in 0..epochs:
//!     on_epoch_begin(epoch)
//!     record = run_epoch(model, callbacks, epoch)      // batch hooks fire in here
//!     history += record
//!     on_epoch_end(epoch)
//!     break if model.stop_training()
//! on_train_end
//! ```

use crate::callbacks::{Callback, CallbackList};
use crate::history::{History, Metrics, Stream};
use crate::tensor::TensorError;
use log::info;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TrainError>;

/// The model as seen by callbacks.
pub trait Model {
    /// Architecture description written next to checkpoints.
    fn to_yaml(&self) -> Result<String>;

    fn save_weights(&self, path: &Path) -> Result<()>;

    fn stop_training(&self) -> bool;

    fn set_stop_training(&mut self, stop: bool);
}

/// Metrics produced by one epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochRecord {
    pub train: Metrics,
    /// `None` when the epoch ran without a validation pass.
    pub validate: Option<Metrics>,
}

impl EpochRecord {
    pub fn new(train: Metrics, validate: Metrics) -> Self {
        Self {
            train,
            validate: Some(validate),
        }
    }
}

/// Runs up to `epochs` epochs and returns the recorded history.
///
/// `run_epoch` receives the model, the callback list (to fire batch hooks) and the epoch
/// index. Any error from the closure or a callback aborts training without calling
/// `on_train_end`.
pub fn fit<M, F>(
    model: &mut M,
    epochs: usize,
    callbacks: &mut CallbackList,
    mut run_epoch: F,
) -> Result<History>
where
    M: Model,
    F: FnMut(&mut M, &mut CallbackList, usize) -> Result<EpochRecord>,
{
    let mut history = History::new();
    model.set_stop_training(false);

    callbacks.on_train_begin(model, &history)?;
    for epoch in 0..epochs {
        callbacks.on_epoch_begin(epoch, model, &history)?;

        let record = run_epoch(model, callbacks, epoch)?;
        info!("epoch {}: train {:?}, validate {:?}", epoch, record.train, record.validate);
        history.record(Stream::Train, record.train);
        if let Some(validate) = record.validate {
            history.record(Stream::Validate, validate);
        }

        callbacks.on_epoch_end(epoch, model, &history)?;
        if model.stop_training() {
            info!("training stopped after epoch {}", epoch);
            break;
        }
    }
    callbacks.on_train_end(model, &history)?;

    Ok(history)
}
