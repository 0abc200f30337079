use crate::callbacks::{Callback, Monitor};
use crate::history::History;
use crate::training::{Model, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Architecture file inside the checkpoint directory.
pub const ARCH_FILE: &str = "arch.yaml";
/// Weights file inside the checkpoint directory.
pub const WEIGHTS_FILE: &str = "weights.h5";

/// Saves the model into a directory at the end of epochs, overwriting the previous save.
///
/// With `save_best_only` a save happens only when the monitored metric beats the best seen
/// so far; otherwise every epoch saves.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    dir: PathBuf,
    monitor: Monitor,
    save_best_only: bool,
    save_weights_only: bool,
    best: f64,
    dir_checked: bool,
    last_saved_epoch: Option<usize>,
}

impl ModelCheckpoint {
    pub fn new(dir: impl Into<PathBuf>, monitor: impl Into<String>) -> Self {
        let monitor = Monitor::new(monitor);
        let best = monitor.mode().initial_best();
        Self {
            dir: dir.into(),
            monitor,
            save_best_only: false,
            save_weights_only: false,
            best,
            dir_checked: false,
            last_saved_epoch: None,
        }
    }

    pub fn with_save_best_only(mut self, save_best_only: bool) -> Self {
        self.save_best_only = save_best_only;
        self
    }

    pub fn with_save_weights_only(mut self, save_weights_only: bool) -> Self {
        self.save_weights_only = save_weights_only;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn last_saved_epoch(&self) -> Option<usize> {
        self.last_saved_epoch
    }

    fn ensure_dir(&mut self) -> Result<()> {
        if !self.dir_checked {
            fs::create_dir_all(&self.dir)?;
            self.dir_checked = true;
        }
        Ok(())
    }

    fn save(&mut self, epoch: usize, model: &dyn Model) -> Result<()> {
        self.ensure_dir()?;
        if !self.save_weights_only {
            fs::write(self.dir.join(ARCH_FILE), model.to_yaml()?)?;
        }
        model.save_weights(&self.dir.join(WEIGHTS_FILE))?;

        self.last_saved_epoch = Some(epoch);
        debug!("epoch {}: checkpoint written to {}", epoch, self.dir.display());
        Ok(())
    }
}

impl Callback for ModelCheckpoint {
    fn on_train_begin(&mut self, _model: &mut dyn Model, _history: &History) -> Result<()> {
        self.best = self.monitor.mode().initial_best();
        Ok(())
    }

    fn on_epoch_end(&mut self, epoch: usize, model: &mut dyn Model, history: &History) -> Result<()> {
        if !self.save_best_only {
            return self.save(epoch, model);
        }

        let Some(score) = self.monitor.current(history, "Model checkpoint") else {
            return Ok(());
        };
        if self.monitor.mode().improved(score, self.best) {
            info!(
                "epoch {}: {} improved from {} to {}",
                epoch,
                self.monitor.name(),
                self.best,
                score
            );
            self.best = score;
            self.save(epoch, model)?;
        }
        Ok(())
    }
}
