//! Trains a linear pitch readout on top of a local self-attention layer using synthetic
//! spectrograms, then prints the aggregated F0 contour of the validation clip.
//!
//! ```text
//! LOG_LEVEL=info cargo run -p transcribe-rs-demos --bin contour_train -- [config.json]
//! ```

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::Path;
use transcribe_rs::callbacks::Callback;
use transcribe_rs::checkpoint::save_weights;
use transcribe_rs::config::{
    AttentionConfig, CheckpointConfig, EarlyStoppingConfig, TrainingConfig, load_config,
};
use transcribe_rs::contour::aggregate_f0_info;
use transcribe_rs::history::metrics;
use transcribe_rs::nn::LocalSelfAttention2d;
use transcribe_rs::tensor::Tensor;
use transcribe_rs::training::Result;
use transcribe_rs::{EpochRecord, Model, fit};

const FRAMES: usize = 64;
const BINS: usize = 48;
const CHANNELS: usize = 8;
/// Seconds per frame.
const HOP: f64 = 0.02;
/// Frequency of bin 0 (A1); bins are semitones.
const BASE_HZ: f64 = 55.0;

// --- Synthetic data ---

struct Clip {
    features: Tensor<f32, 4>,
    /// Active bin per frame, `None` for silence.
    melody: Vec<Option<usize>>,
}

fn synth_clip(rng: &mut StdRng) -> Clip {
    let mut melody = Vec::with_capacity(FRAMES);
    let mut note = rng.random_range(12..BINS - 12);
    while melody.len() < FRAMES {
        let len = rng.random_range(4..12);
        let active = rng.random_bool(0.8);
        for _ in 0..len.min(FRAMES - melody.len()) {
            melody.push(active.then_some(note));
        }
        note = (note as isize + rng.random_range(-4i64..=4) as isize).clamp(0, BINS as isize - 13) as usize;
    }

    let mut data = vec![0.0f32; FRAMES * BINS * CHANNELS];
    for (t, bin) in melody.iter().enumerate() {
        for f in 0..BINS {
            for c in 0..CHANNELS {
                let mut v = rng.random_range(0.0..0.1);
                if let Some(bin) = *bin {
                    // Fundamental on every channel, octave harmonic on odd channels.
                    if f == bin || (c % 2 == 1 && f == bin + 12) {
                        v += 1.0;
                    }
                }
                data[(t * BINS + f) * CHANNELS + c] = v;
            }
        }
    }

    Clip {
        features: Tensor::new(data, [1, FRAMES, BINS, CHANNELS]).unwrap(),
        melody,
    }
}

fn bin_to_hz(bin: usize) -> f64 {
    BASE_HZ * 2f64.powf(bin as f64 / 12.0)
}

// --- Model ---

struct ContourModel {
    attention: LocalSelfAttention2d,
    config: AttentionConfig,
    /// Channel weights of the per-bin salience readout.
    readout: Vec<f32>,
    learning_rate: f32,
    stop: bool,
}

impl ContourModel {
    /// `[frames, bins]` salience map.
    fn salience(&self, clip: &Clip) -> Vec<f32> {
        let attended = self.attention.forward(&clip.features).unwrap();
        attended
            .data()
            .chunks(CHANNELS)
            .map(|cell| cell.iter().zip(&self.readout).map(|(x, w)| x * w).sum())
            .collect()
    }

    /// One gradient step of mean squared error against the one-hot melody map.
    fn train_step(&mut self, clip: &Clip) -> f64 {
        let attended = self.attention.forward(&clip.features).unwrap();
        let mut grad = vec![0.0f32; CHANNELS];
        let mut loss = 0.0f64;

        for (i, cell) in attended.data().chunks(CHANNELS).enumerate() {
            let (t, f) = (i / BINS, i % BINS);
            let target = if clip.melody[t] == Some(f) { 1.0 } else { 0.0 };
            let pred: f32 = cell.iter().zip(&self.readout).map(|(x, w)| x * w).sum();
            let err = pred - target;
            loss += (err * err) as f64;
            for (g, x) in grad.iter_mut().zip(cell) {
                *g += 2.0 * err * x;
            }
        }

        let n = (FRAMES * BINS) as f32;
        for (w, g) in self.readout.iter_mut().zip(&grad) {
            *w -= self.learning_rate * g / n;
        }
        loss / n as f64
    }

    /// Per-frame frequency in Hz, 0 where the salience peak is too weak.
    fn predict_f0(&self, clip: &Clip) -> Vec<f64> {
        self.salience(clip)
            .chunks(BINS)
            .map(|frame| {
                let (bin, &peak) = frame
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .unwrap();
                if peak > 0.5 { bin_to_hz(bin) } else { 0.0 }
            })
            .collect()
    }

    fn evaluate(&self, clip: &Clip) -> (f64, f64) {
        let f0 = self.predict_f0(clip);
        let hits = f0
            .iter()
            .zip(&clip.melody)
            .filter(|(hz, bin)| match bin {
                Some(bin) => (**hz - bin_to_hz(*bin)).abs() < 1e-6,
                None => **hz == 0.0,
            })
            .count();

        let salience = self.salience(clip);
        let loss = salience
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let target = if clip.melody[i / BINS] == Some(i % BINS) { 1.0 } else { 0.0 };
                ((p - target) as f64).powi(2)
            })
            .sum::<f64>()
            / salience.len() as f64;

        (hits as f64 / FRAMES as f64, loss)
    }
}

impl Model for ContourModel {
    fn to_yaml(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "name": "contour_model",
            "channels": CHANNELS,
            "bins": BINS,
            "attention": self.config,
        }))?)
    }

    fn save_weights(&self, path: &Path) -> Result<()> {
        let mut weights = HashMap::new();
        weights.insert(
            "readout".to_string(),
            Tensor::<f32, 2>::new(self.readout.clone(), [CHANNELS, 1])?,
        );
        save_weights(path, &weights)
    }

    fn stop_training(&self) -> bool {
        self.stop
    }

    fn set_stop_training(&mut self, stop: bool) {
        self.stop = stop;
    }
}

fn default_config() -> TrainingConfig {
    TrainingConfig {
        epochs: 40,
        attention: AttentionConfig {
            num_heads: 2,
            query_shape: [8, 16],
            memory_flange: [4, 8],
            dropout_rate: 0.0,
        },
        early_stopping: Some(EarlyStoppingConfig {
            monitor: "val_acc".into(),
            patience: 5,
        }),
        checkpoint: Some(CheckpointConfig {
            dir: std::env::temp_dir().join("transcribe-rs-contour"),
            monitor: "val_acc".into(),
            save_best_only: true,
            save_weights_only: false,
        }),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOG_LEVEL", "warn")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path).unwrap(),
        None => default_config(),
    };
    info!("config: {:?}", config);

    let mut rng = StdRng::seed_from_u64(42);
    let train_clips: Vec<Clip> = (0..4).map(|_| synth_clip(&mut rng)).collect();
    let val_clip = synth_clip(&mut rng);

    let mut model = ContourModel {
        attention: config.attention.layer(CHANNELS).unwrap(),
        config: config.attention.clone(),
        readout: (0..CHANNELS).map(|_| rng.random_range(-0.1..0.1)).collect(),
        learning_rate: 0.5,
        stop: false,
    };

    let mut callbacks = config.callbacks();
    let history = fit(&mut model, config.epochs, &mut callbacks, |model, callbacks, _epoch| {
        let mut train_loss = 0.0;
        for (batch, clip) in train_clips.iter().enumerate() {
            callbacks.on_train_batch_begin(batch)?;
            train_loss += model.train_step(clip);
            callbacks.on_train_batch_end(batch)?;
        }
        train_loss /= train_clips.len() as f64;

        callbacks.on_test_batch_begin(0)?;
        let (accuracy, loss) = model.evaluate(&val_clip);
        callbacks.on_test_batch_end(0)?;

        Ok(EpochRecord::new(
            metrics([("loss", train_loss)]),
            metrics([("accuracy", accuracy), ("loss", loss)]),
        ))
    })
    .unwrap();

    println!("trained {} epochs", history.train().len());
    if let Some(last) = history.validate().last() {
        println!("final validation: {:?}", last);
    }

    for segment in aggregate_f0_info(&model.predict_f0(&val_clip), HOP) {
        println!("{}", serde_json::to_string(&segment).unwrap());
    }
}
