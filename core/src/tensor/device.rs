//! Devices own tensor storage.
//!
//! `Cpu` keeps data in a heap `Vec<T>` and runs kernels from `transcribe-rs-kernels`.
//! `ConstDevice<N>` keeps data in a fixed `[T; N]` array so small tensors (masks, reference
//! kernels) can be written as `const` items. Moving data from one device to another is a
//! copy; [`crate::tensor::cast_like`] reports such copies.

use crate::tensor::{Result, Storage, TensorElem, TensorError};
use std::fmt::Debug;

/// Where a tensor's data lives and how device-specific layout ops run.
pub trait Device: Clone + Debug + PartialEq + Send + Sync {
    /// The container used for tensor data on this device.
    type Storage<T>: Storage<T>
    where
        T: TensorElem;

    /// Human readable device name.
    ///
    /// ```rust
    /// use transcribe_rs::tensor::{Cpu, Device};
    /// assert_eq!(Cpu.name(), "CPU");
    /// ```
    fn name(&self) -> &'static str;

    /// Swaps the last two axes of `data`.
    fn transpose<T: TensorElem, const RANK: usize>(
        data: &Self::Storage<T>,
        shape: &[usize; RANK],
    ) -> Result<Self::Storage<T>>;
}

/// Host memory. The default device.
#[derive(Clone, Debug, PartialEq)]
pub struct Cpu;

impl Device for Cpu {
    type Storage<T>
        = Vec<T>
    where
        T: TensorElem;

    fn name(&self) -> &'static str {
        "CPU"
    }

    fn transpose<T: TensorElem, const RANK: usize>(
        data: &Self::Storage<T>,
        shape: &[usize; RANK],
    ) -> Result<Self::Storage<T>> {
        if RANK < 2 {
            return Err(TensorError::Unsupported(
                "Transpose requires rank >= 2".into(),
            ));
        }
        Ok(transcribe_rs_kernels::cpu_transpose(data, shape)?)
    }
}

/// Fixed-size storage for compile-time constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstDevice<const N: usize>;

impl<const N: usize> Device for ConstDevice<N> {
    type Storage<T>
        = [T; N]
    where
        T: TensorElem;

    fn name(&self) -> &'static str {
        "ConstDevice"
    }

    fn transpose<T: TensorElem, const RANK: usize>(
        data: &Self::Storage<T>,
        shape: &[usize; RANK],
    ) -> Result<Self::Storage<T>> {
        if RANK < 2 {
            return Err(TensorError::Unsupported(
                "Transpose requires rank >= 2".into(),
            ));
        }

        let mut new_shape = *shape;
        new_shape.swap(RANK - 1, RANK - 2);
        let old_strides = crate::tensor::compute_strides(shape);
        let new_strides = crate::tensor::compute_strides(&new_shape);

        let mut out = [T::zero(); N];
        for (i, &value) in data.iter().enumerate() {
            let mut coords = [0; RANK];
            let mut rem = i;
            for d in 0..RANK {
                coords[d] = rem / old_strides[d];
                rem %= old_strides[d];
            }
            coords.swap(RANK - 1, RANK - 2);

            let j: usize = coords.iter().zip(&new_strides).map(|(c, s)| c * s).sum();
            out[j] = value;
        }
        Ok(out)
    }
}
