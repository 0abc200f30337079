//! Core tensor type.
//!
//! A [`Tensor`] is a flat row-major buffer plus a shape. Rank is part of the type, sizes are
//! not, so a `Tensor<f32, 5>` can hold any `[batch, heads, height, width, channels]` feature
//! map while block sizes are chosen at runtime.
//!
//! ```rust
//! use transcribe_rs::tensor::Tensor;
//!
//! // One spectrogram patch: batch 1, 2x3 time-frequency grid, 1 channel
//! let patch = Tensor::<f32, 4>::new(vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5], [1, 2, 3, 1]).unwrap();
//!
//! assert_eq!(patch.shape(), &[1, 2, 3, 1]);
//! assert_eq!(patch.strides(), &[6, 3, 1, 1]);
//! ```
//!
//! > [!NOTE]
//! > Data is always contiguous. Layout changes such as [`Tensor::permute`] physically move
//! > elements instead of rewriting strides.

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod device;
pub mod dtype;
pub mod ops;
pub mod shape;
pub mod storage;

pub use device::{ConstDevice, Cpu, Device};
pub use dtype::{DType, HasDType, MixedPrecision, cast, cast_like};
pub use ops::TensorOps;
pub use shape::{
    Dim, combine_heads_2d, combine_last_two_dimensions, pad_to_multiple_2d, reshape_range,
    shape_list, split_heads_2d, split_last_dimension,
};
pub use storage::Storage;

/// Error type for tensor operations.
#[derive(Error, Debug)]
pub enum TensorError {
    /// The shape of the data does not match the expected shape.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// An index is out of bounds for the given shape.
    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
    /// The requested operation is not supported (e.g., for a specific rank or type).
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Encoding or decoding tensors to a byte format failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<transcribe_rs_kernels::KernelError> for TensorError {
    fn from(err: transcribe_rs_kernels::KernelError) -> Self {
        match err {
            transcribe_rs_kernels::KernelError::ShapeMismatch { expected, got } => {
                TensorError::ShapeMismatch { expected, got }
            }
            transcribe_rs_kernels::KernelError::IndexOutOfBounds { index, len } => {
                TensorError::IndexOutOfBounds {
                    index: vec![index],
                    shape: vec![len],
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Trait bound for elements that can be stored in a Tensor.
///
/// Covers floats (`f32`, `f64`, `half::f16`, `half::bf16`) and integers alike. Index maps
/// are plain `Tensor<usize, 2>`.
pub trait TensorElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> TensorElem for T where
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

/// An N-dimensional array.
///
/// - `T`: element type.
/// - `RANK`: number of dimensions, fixed at compile time.
/// - `D`: device owning the storage, `Cpu` unless stated otherwise.
///
/// Keeping the rank in the type means a block-attention pipeline that goes from
/// `[b, H, W, c]` to `[b, heads, blocks, area, depth]` spells every step out in its
/// signatures, while the sizes themselves stay runtime values.
#[derive(Clone, Copy)]
pub struct Tensor<T, const RANK: usize, D: Device = Cpu>
where
    T: TensorElem,
{
    shape: [usize; RANK],
    strides: [usize; RANK],
    data: D::Storage<T>,
    device: D,
}

impl<T, const RANK: usize> Tensor<T, RANK, Cpu>
where
    T: TensorElem,
{
    /// Creates a tensor from flat row-major data.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if `data.len()` differs from the product of `shape`.
    pub fn new(data: Vec<T>, shape: [usize; RANK]) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![size],
                got: vec![data.len()],
            });
        }

        Ok(Self {
            shape,
            strides: compute_strides(&shape),
            data,
            device: Cpu,
        })
    }

    /// Creates a tensor with every element set to `value`.
    pub fn full(shape: [usize; RANK], value: T) -> Self {
        let size: usize = shape.iter().product();
        Self {
            shape,
            strides: compute_strides(&shape),
            data: vec![value; size],
            device: Cpu,
        }
    }

    /// Creates a tensor filled with zeros.
    pub fn zeros(shape: [usize; RANK]) -> Self {
        Self::full(shape, T::zero())
    }

    /// Creates a tensor filled with ones.
    pub fn ones(shape: [usize; RANK]) -> Self {
        Self::full(shape, T::one())
    }

    /// Reinterprets the data under a new shape with the same number of elements.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the element counts differ.
    pub fn reshape<const NEW_RANK: usize>(
        self,
        new_shape: [usize; NEW_RANK],
    ) -> Result<Tensor<T, NEW_RANK, Cpu>> {
        let current_size: usize = self.shape.iter().product();
        let new_size: usize = new_shape.iter().product();

        if current_size != new_size {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.to_vec(),
                got: new_shape.to_vec(),
            });
        }

        Ok(Tensor {
            shape: new_shape,
            strides: compute_strides(&new_shape),
            data: self.data,
            device: self.device,
        })
    }

    /// Consumes the tensor and returns its flat data.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}

impl<T, const RANK: usize, const N: usize> Tensor<T, RANK, ConstDevice<N>>
where
    T: TensorElem,
{
    /// Creates a compile-time tensor from an array.
    ///
    /// # Panics
    ///
    /// Panics (at compile time in const context) if `N` differs from the product of `shape`.
    pub const fn new_const(data: [T; N], shape: [usize; RANK]) -> Self {
        let mut size = 1;
        let mut i = 0;
        while i < RANK {
            size *= shape[i];
            i += 1;
        }

        assert!(
            N == size,
            "Shape mismatch: data length does not match shape product"
        );

        Self {
            shape,
            strides: compute_strides(&shape),
            data,
            device: ConstDevice,
        }
    }

    /// Const reshape.
    ///
    /// # Panics
    ///
    /// Panics if the element count changes.
    pub const fn reshape<const NEW_RANK: usize>(
        self,
        new_shape: [usize; NEW_RANK],
    ) -> Tensor<T, NEW_RANK, ConstDevice<N>> {
        let mut new_size = 1;
        let mut i = 0;
        while i < NEW_RANK {
            new_size *= new_shape[i];
            i += 1;
        }

        assert!(
            N == new_size,
            "Shape mismatch: new shape size does not match tensor size"
        );

        Tensor {
            shape: new_shape,
            strides: compute_strides(&new_shape),
            data: self.data,
            device: ConstDevice,
        }
    }
}

/// Row-major strides for `shape`: the last axis has stride 1.
pub(crate) const fn compute_strides<const RANK: usize>(shape: &[usize; RANK]) -> [usize; RANK] {
    let mut strides = [0; RANK];
    let mut stride = 1;
    let mut i = RANK;
    while i > 0 {
        i -= 1;
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

impl<T, const RANK: usize, D: Device> Tensor<T, RANK, D>
where
    T: TensorElem,
{
    /// Returns the shape of the tensor.
    pub const fn shape(&self) -> &[usize; RANK] {
        &self.shape
    }

    /// Returns the row-major strides of the tensor.
    pub const fn strides(&self) -> &[usize; RANK] {
        &self.strides
    }

    /// Returns the device holding the data.
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Returns the underlying data as a flat slice.
    pub fn data(&self) -> &[T] {
        self.data.as_slice()
    }

    /// Returns the underlying data as a mutable flat slice.
    pub fn data_mut(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    /// Total number of elements.
    pub const fn size(&self) -> usize {
        let mut size = 1;
        let mut i = 0;
        while i < RANK {
            size *= self.shape[i];
            i += 1;
        }
        size
    }
}

impl<T, const RANK: usize, D: Device> Debug for Tensor<T, RANK, D>
where
    T: TensorElem,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("device", &self.device.name())
            .field("data_len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let tensor = Tensor::<f32, 2>::new(data.clone(), [2, 2]).unwrap();
        assert_eq!(tensor.shape(), &[2, 2]);
        assert_eq!(tensor.data(), &data[..]);

        let err = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0], [2, 2]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_full_zeros_ones() {
        assert_eq!(Tensor::<f32, 2>::zeros([2, 3]).data(), &[0.0; 6]);
        assert_eq!(Tensor::<f32, 2>::ones([2, 3]).data(), &[1.0; 6]);
        assert_eq!(Tensor::<usize, 1>::full([3], 7).data(), &[7, 7, 7]);
    }

    #[test]
    fn test_reshape() {
        let tensor = Tensor::<f32, 5>::zeros([1, 2, 4, 4, 3]);

        let reshaped = tensor.reshape([2, 16, 3]).unwrap();
        assert_eq!(reshaped.shape(), &[2, 16, 3]);
        assert_eq!(reshaped.strides(), &[48, 3, 1]);

        let err = reshaped.reshape([4, 2]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_into_data() {
        let t = Tensor::<i64, 1>::new(vec![3, 1, 2], [3]).unwrap();
        assert_eq!(t.into_data(), vec![3, 1, 2]);
    }

    #[test]
    fn test_macro() {
        let t = tensor!([1.0, 2.0, 3.0, 4.0], [2, 2]);
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_compute_strides() {
        // [batch, heads, height, width, depth]
        let strides = compute_strides(&[2, 4, 8, 16, 32]);
        assert_eq!(strides, [16384, 4096, 512, 32, 1]);
    }

    #[test]
    fn test_kernel_error_conversion() {
        let err: TensorError = transcribe_rs_kernels::KernelError::IndexOutOfBounds {
            index: 9,
            len: 4,
        }
        .into();
        assert!(matches!(
            err,
            TensorError::IndexOutOfBounds { ref index, ref shape } if index == &[9] && shape == &[4]
        ));
    }

    #[test]
    fn test_tensor_error_display() {
        let err = TensorError::ShapeMismatch {
            expected: vec![2, 2],
            got: vec![4],
        };
        assert_eq!(
            format!("{}", err),
            "Shape mismatch: expected [2, 2], got [4]"
        );

        let err = TensorError::Unsupported("rank 3".to_string());
        assert_eq!(format!("{}", err), "Unsupported operation: rank 3");

        let err = TensorError::Serialization("bad header".to_string());
        assert_eq!(format!("{}", err), "Serialization failed: bad header");
    }

    #[test]
    fn test_tensor_debug() {
        let t = Tensor::<f32, 1>::new(vec![1.0], [1]).unwrap();
        let debug_str = format!("{:?}", t);
        assert!(debug_str.contains("shape"));
        assert!(debug_str.contains("CPU"));
    }

    #[test]
    fn test_const_tensor() {
        const KERNEL: Tensor<f32, 2, ConstDevice<4>> = Tensor::new_const([1.0, 0.0, 0.0, 1.0], [2, 2]);
        const FLAT: Tensor<f32, 1, ConstDevice<4>> = KERNEL.reshape([4]);

        assert_eq!(KERNEL.size(), 4);
        assert_eq!(KERNEL.strides(), &[2, 1]);
        assert_eq!(FLAT.shape(), &[4]);
        assert_eq!(FLAT.data(), &[1.0, 0.0, 0.0, 1.0]);
        assert!(format!("{:?}", KERNEL).contains("ConstDevice"));
    }

    #[test]
    #[should_panic(expected = "Shape mismatch: data length does not match shape product")]
    fn test_const_new_panic() {
        let _t: Tensor<f32, 2, ConstDevice<3>> = Tensor::new_const([1.0, 2.0, 3.0], [2, 2]);
    }
}
