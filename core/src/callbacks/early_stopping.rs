use crate::callbacks::{Callback, Monitor};
use crate::history::History;
use crate::training::{Model, Result};
use log::info;

/// Stops training once the monitored metric has not improved for `patience` epochs.
///
/// After the stop signal fires it is raised again on every later epoch that still has
/// `wait >= patience`, in case the loop ignored it.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: Monitor,
    patience: usize,
    wait: usize,
    best: f64,
    stopped_epoch: Option<usize>,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::new("val_acc", 5)
    }
}

impl EarlyStopping {
    pub fn new(monitor: impl Into<String>, patience: usize) -> Self {
        let monitor = Monitor::new(monitor);
        let best = monitor.mode().initial_best();
        Self {
            monitor,
            patience,
            wait: 0,
            best,
            stopped_epoch: None,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    /// Epochs since the last improvement.
    pub fn wait(&self) -> usize {
        self.wait
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// The last epoch at which the stop signal was raised.
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl Callback for EarlyStopping {
    fn on_train_begin(&mut self, _model: &mut dyn Model, _history: &History) -> Result<()> {
        self.wait = 0;
        self.best = self.monitor.mode().initial_best();
        self.stopped_epoch = None;
        Ok(())
    }

    fn on_epoch_end(&mut self, epoch: usize, model: &mut dyn Model, history: &History) -> Result<()> {
        let Some(score) = self.monitor.current(history, "Early stopping") else {
            return Ok(());
        };

        if self.monitor.mode().improved(score, self.best) {
            self.best = score;
            self.wait = 0;
        } else {
            self.wait += 1;
        }

        if self.wait >= self.patience {
            info!("epoch {}: early stopping signalled, wait {}", epoch, self.wait);
            model.set_stop_training(true);
            self.stopped_epoch = Some(epoch);
        }
        Ok(())
    }

    fn on_train_end(&mut self, _model: &mut dyn Model, _history: &History) -> Result<()> {
        if let Some(epoch) = self.stopped_epoch {
            info!(
                "Early stopped training at epoch {}: no {} improvement over {} for {} epochs",
                epoch,
                self.monitor.name(),
                self.best,
                self.wait
            );
        }
        Ok(())
    }
}
