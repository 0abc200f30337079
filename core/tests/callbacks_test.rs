use std::collections::HashMap;
use std::path::Path;
use transcribe_rs::callbacks::checkpoint::{ARCH_FILE, WEIGHTS_FILE};
use transcribe_rs::callbacks::{Callback, CallbackList, EarlyStopping, ModelCheckpoint};
use transcribe_rs::checkpoint::{load_weights, save_weights};
use transcribe_rs::history::metrics;
use transcribe_rs::tensor::Tensor;
use transcribe_rs::training::Result;
use transcribe_rs::{EpochRecord, History, Model, Stream, fit};

/// A stand-in pitch model whose single weight matrix is filled with the epoch it was
/// last trained in, so every save is distinguishable on disk.
#[derive(Debug, Default)]
struct PitchModel {
    weights: HashMap<String, Tensor<f32, 2>>,
    stop: bool,
}

impl PitchModel {
    fn train_epoch(&mut self, epoch: usize) {
        self.weights
            .insert("dense".to_string(), Tensor::full([2, 2], epoch as f32));
    }
}

impl Model for PitchModel {
    fn to_yaml(&self) -> Result<String> {
        Ok(serde_json::to_string(&serde_json::json!({
            "name": "pitch_model",
            "layers": self.weights.keys().collect::<Vec<_>>(),
        }))?)
    }

    fn save_weights(&self, path: &Path) -> Result<()> {
        save_weights(path, &self.weights)
    }

    fn stop_training(&self) -> bool {
        self.stop
    }

    fn set_stop_training(&mut self, stop: bool) {
        self.stop = stop;
    }
}

fn validation(accuracy: f64) -> EpochRecord {
    EpochRecord::new(metrics([("loss", 1.0 - accuracy)]), metrics([("accuracy", accuracy)]))
}

#[test]
fn test_early_stopping_fires_patience_epochs_after_improvement() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Best accuracy at epoch 2, then strictly worse.
    let accuracies = [0.5, 0.6, 0.7, 0.65, 0.6, 0.55, 0.5, 0.45, 0.4];
    let patience = 3;

    let mut model = PitchModel::default();
    let mut callbacks = CallbackList::new().with(EarlyStopping::new("val_acc", patience));
    let history = fit(&mut model, accuracies.len(), &mut callbacks, |model, _, epoch| {
        model.train_epoch(epoch);
        Ok(validation(accuracies[epoch]))
    })
    .unwrap();

    // Epochs 3, 4 and 5 do not improve; the signal fires at the end of epoch 2 + 3.
    assert!(model.stop_training());
    assert_eq!(history.validate().len(), 2 + patience + 1);
}

#[test]
fn test_early_stopping_does_not_fire_early() {
    let mut model = PitchModel::default();
    let mut es = EarlyStopping::new("val_acc", 3);
    let mut history = History::new();
    es.on_train_begin(&mut model, &history).unwrap();

    for (epoch, acc) in [0.7, 0.6, 0.6, 0.6].into_iter().enumerate() {
        history.record(Stream::Validate, metrics([("accuracy", acc)]));
        es.on_epoch_end(epoch, &mut model, &history).unwrap();
        assert_eq!(model.stop_training(), epoch == 3, "epoch {}", epoch);
    }
    assert_eq!(es.stopped_epoch(), Some(3));

    // A fresh run starts from a clean slate.
    let history = History::new();
    es.on_train_begin(&mut model, &history).unwrap();
    assert_eq!(es.wait(), 0);
    assert_eq!(es.stopped_epoch(), None);
}

#[test]
fn test_checkpoint_gating() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("vocal");
    let weights_path = dir.join(WEIGHTS_FILE);

    let mut model = PitchModel::default();
    let mut ckpt = ModelCheckpoint::new(&dir, "val_acc").with_save_best_only(true);
    let mut history = History::new();
    ckpt.on_train_begin(&mut model, &history).unwrap();

    let mut run_epoch = |epoch: usize, acc: f64, model: &mut PitchModel, history: &mut History| {
        model.train_epoch(epoch);
        history.record(Stream::Validate, metrics([("accuracy", acc)]));
        ckpt.on_epoch_end(epoch, model, history).unwrap();
    };

    run_epoch(0, 0.5, &mut model, &mut history);
    let first = std::fs::read(&weights_path).unwrap();
    assert!(dir.join(ARCH_FILE).exists());

    // Worse score: nothing is written.
    run_epoch(1, 0.4, &mut model, &mut history);
    assert_eq!(std::fs::read(&weights_path).unwrap(), first);

    // Better score: the weights of epoch 2 replace those of epoch 0.
    run_epoch(2, 0.8, &mut model, &mut history);
    assert_ne!(std::fs::read(&weights_path).unwrap(), first);
    let saved = load_weights::<f32, 2>(&weights_path).unwrap();
    assert_eq!(saved["dense"].data(), &[2.0; 4]);
}

#[test]
fn test_missing_metric_skips_checkpoint() {
    let _ = env_logger::builder().is_test(true).try_init();

    let tmp = tempfile::tempdir().unwrap();
    let mut model = PitchModel::default();
    let mut ckpt = ModelCheckpoint::new(tmp.path().join("ckpt"), "val_f1").with_save_best_only(true);

    let mut history = History::new();
    ckpt.on_train_begin(&mut model, &history).unwrap();
    model.train_epoch(0);
    history.record(Stream::Validate, metrics([("accuracy", 0.9)]));
    ckpt.on_epoch_end(0, &mut model, &history).unwrap();

    assert_eq!(ckpt.last_saved_epoch(), None);
    assert!(!tmp.path().join("ckpt").exists());
}

#[test]
fn test_configured_callbacks_drive_fit() {
    let tmp = tempfile::tempdir().unwrap();
    let config_json = serde_json::json!({
        "epochs": 20,
        "attention": { "num_heads": 2 },
        "early_stopping": { "monitor": "val_loss", "patience": 1 },
        "checkpoint": { "dir": tmp.path().join("run"), "monitor": "val_loss", "save_weights_only": true }
    });
    let config: transcribe_rs::config::TrainingConfig = serde_json::from_value(config_json).unwrap();
    let mut callbacks = config.callbacks();
    assert_eq!(callbacks.len(), 2);

    let losses = [0.9, 0.5, 0.6, 0.4];
    let mut model = PitchModel::default();
    let history = fit(&mut model, config.epochs, &mut callbacks, |model, callbacks, epoch| {
        for batch in 0..4 {
            callbacks.on_train_batch_begin(batch)?;
            callbacks.on_train_batch_end(batch)?;
        }
        model.train_epoch(epoch);
        Ok(EpochRecord::new(metrics([("loss", losses[epoch])]), metrics([("loss", losses[epoch])])))
    })
    .unwrap();

    // Loss goes up at epoch 2 and patience is 1.
    assert_eq!(history.validate().len(), 3);
    assert!(tmp.path().join("run").join(WEIGHTS_FILE).exists());
    assert!(!tmp.path().join("run").join(ARCH_FILE).exists());
}
