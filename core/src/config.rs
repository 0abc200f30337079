//! Training run configuration.
//!
//! A run is described by one JSON file. Every section except `attention` is optional and
//! every field of a present section has a default, so the smallest valid file is
//! `{"epochs": 10, "attention": {"num_heads": 4}}`.
//!
//! ```json
//! {
//!   "epochs": 30,
//!   "attention": {
//!     "num_heads": 8,
//!     "query_shape": [8, 16],
//!     "memory_flange": [8, 16],
//!     "dropout_rate": 0.1
//!   },
//!   "early_stopping": { "monitor": "val_acc", "patience": 5 },
//!   "checkpoint": { "dir": "checkpoints/vocal", "save_best_only": true }
//! }
//! ```

use crate::attention::{DotProductAttention, LocalAttention2d};
use crate::callbacks::{CallbackList, EarlyStopping, ModelCheckpoint};
use crate::nn::LocalSelfAttention2d;
use crate::training::{Result, TrainError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub attention: AttentionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_stopping: Option<EarlyStoppingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionConfig {
    pub num_heads: usize,
    #[serde(default = "default_block")]
    pub query_shape: [usize; 2],
    #[serde(default = "default_block")]
    pub memory_flange: [usize; 2],
    #[serde(default)]
    pub dropout_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    #[serde(default = "default_monitor")]
    pub monitor: String,
    #[serde(default = "default_patience")]
    pub patience: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub dir: PathBuf,
    #[serde(default = "default_monitor")]
    pub monitor: String,
    #[serde(default)]
    pub save_best_only: bool,
    #[serde(default)]
    pub save_weights_only: bool,
}

fn default_block() -> [usize; 2] {
    [8, 16]
}

fn default_monitor() -> String {
    "val_acc".to_string()
}

fn default_patience() -> usize {
    5
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            monitor: default_monitor(),
            patience: default_patience(),
        }
    }
}

impl AttentionConfig {
    pub fn local_attention(&self) -> LocalAttention2d {
        LocalAttention2d::new(self.query_shape, self.memory_flange).with_attention(
            DotProductAttention::new(self.dropout_rate).with_name("local_attention_2d"),
        )
    }

    /// Builds the multi-head layer for feature maps with `channels` channels.
    pub fn layer(&self, channels: usize) -> Result<LocalSelfAttention2d> {
        Ok(LocalSelfAttention2d::new(
            self.num_heads,
            channels,
            self.local_attention(),
        )?)
    }
}

impl TrainingConfig {
    /// Instantiates the configured callbacks, early stopping first.
    pub fn callbacks(&self) -> CallbackList {
        let mut callbacks = CallbackList::new();
        if let Some(es) = &self.early_stopping {
            callbacks.push(EarlyStopping::new(es.monitor.clone(), es.patience));
        }
        if let Some(ckpt) = &self.checkpoint {
            callbacks.push(
                ModelCheckpoint::new(&ckpt.dir, ckpt.monitor.clone())
                    .with_save_best_only(ckpt.save_best_only)
                    .with_save_weights_only(ckpt.save_weights_only),
            );
        }
        callbacks
    }
}

/// Loads and validates a training configuration from a JSON file.
///
/// # Errors
///
/// `MissingFile` before anything is read if `path` does not exist, `Json` for malformed
/// input and `InvalidConfig` for values [`validate_config`] rejects.
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TrainError::MissingFile(path.to_path_buf()));
    }

    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    let invalid = |msg: String| Err(TrainError::InvalidConfig(msg));

    if config.epochs == 0 {
        return invalid("epochs must be positive".into());
    }

    let attention = &config.attention;
    if attention.num_heads == 0 {
        return invalid("attention.num_heads must be positive".into());
    }
    if attention.query_shape.contains(&0) {
        return invalid(format!(
            "attention.query_shape must be positive, got {:?}",
            attention.query_shape
        ));
    }
    if !(0.0..1.0).contains(&attention.dropout_rate) {
        return invalid(format!(
            "attention.dropout_rate must be in [0, 1), got {}",
            attention.dropout_rate
        ));
    }

    for monitor in [
        config.early_stopping.as_ref().map(|es| &es.monitor),
        config.checkpoint.as_ref().map(|c| &c.monitor),
    ]
    .into_iter()
    .flatten()
    {
        if monitor.is_empty() {
            return invalid("monitor names must not be empty".into());
        }
    }

    Ok(())
}
