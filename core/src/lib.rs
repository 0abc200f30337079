//! # transcribe-rs
//!
//! The computational core of a neural music-transcription stack: block-local self-attention
//! over time-frequency feature maps, and the callback-driven training loop that decides when
//! a pitch model stops training and which weights get kept.
//!
//! Everything runs on the CPU. Heavy loops live in `transcribe-rs-kernels` and are spread
//! over the rayon pool.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: ranked tensors, dtypes and shape helpers.
//! - [`attention`]: block indexing, dot-product and local 2-D attention.
//! - [`nn`]: the multi-head [`nn::LocalSelfAttention2d`] layer.
//! - [`callbacks`], [`history`], [`training`]: early stopping, checkpointing and the epoch loop.
//! - [`config`], [`checkpoint`]: JSON run configuration and safetensors weight files.
//! - [`contour`]: F0 contour to note-segment aggregation.
//!
//! ## Example
//!
//! ```rust
//! use transcribe_rs::attention::local_attention_2d;
//! use transcribe_rs::tensor::Tensor;
//!
//! // [batch, heads, time, freq, depth]
//! let x = Tensor::<f32, 5>::ones([1, 2, 12, 20, 4]);
//! let y = local_attention_2d(&x, &x, &x, [4, 8], [2, 4]).unwrap();
//! assert_eq!(y.shape(), &[1, 2, 12, 20, 4]);
//! ```

/// Builds a CPU tensor from an array literal, checking at compile time that the element
/// count matches the shape.
///
/// ```rust
/// use transcribe_rs::tensor;
///
/// // 2x3 one-hot mask
/// let mask = tensor!([1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0], [2, 3]);
/// assert_eq!(mask.shape(), &[2, 3]);
/// ```
///
/// `tensor!([1.0, 2.0, 3.0], [2, 2])` is rejected by the compiler.
#[macro_export]
macro_rules! tensor {
    ($data:expr, $shape:expr) => {{
        const LEN: usize = (&$data as &[_]).len();
        const SHAPE: [usize; (&$shape as &[_]).len()] = $shape;
        const NUMEL: usize = {
            let mut numel = 1;
            let mut axis = 0;
            while axis < (&SHAPE as &[_]).len() {
                numel *= SHAPE[axis];
                axis += 1;
            }
            numel
        };
        const _: () = assert!(LEN == NUMEL, "tensor!: element count does not match shape");

        match $crate::tensor::Tensor::new($data.to_vec(), $shape) {
            Ok(t) => t,
            Err(_) => unreachable!(),
        }
    }};
}

pub mod attention;
pub mod callbacks;
pub mod checkpoint;
pub mod config;
pub mod contour;
pub mod history;
pub mod kernels;
pub mod nn;
pub mod tensor;
pub mod training;

pub use history::{History, Metrics, Stream};
pub use tensor::{ConstDevice, Cpu, Device, Storage, Tensor, TensorElem, TensorError, TensorOps};
pub use training::{EpochRecord, Model, TrainError, fit};
