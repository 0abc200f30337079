//! Slice-level CPU kernels.
//!
//! Every kernel here works on flat row-major buffers plus an explicit shape, so the crate
//! has no notion of a tensor type. `transcribe-rs` wraps these in its `Tensor` API.

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod cpu_conv2d;
pub mod cpu_gather;
pub mod cpu_matmul;
pub mod cpu_transpose;

pub use cpu_conv2d::cpu_conv2d;
pub use cpu_gather::{cpu_gather_rows, cpu_scatter_add_rows};
pub use cpu_matmul::cpu_matmul;
pub use cpu_transpose::{cpu_permute, cpu_transpose};

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Element bound shared by all kernels.
///
/// Kept in sync with `TensorElem` in the main crate so that any tensor element can be handed
/// straight to a kernel. Integer types qualify too, which is what lets index maps be built
/// with the same convolution kernel as activations.
pub trait KernelElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> KernelElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// Checks that a flat buffer holds exactly `shape.iter().product()` elements.
pub(crate) fn check_len(len: usize, shape: &[usize]) -> Result<()> {
    let expected: usize = shape.iter().product();
    if len != expected {
        return Err(KernelError::ShapeMismatch {
            expected: vec![expected],
            got: vec![len],
        });
    }
    Ok(())
}
