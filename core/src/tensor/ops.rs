//! Tensor operations.
//!
//! # Overview
//!
//! - **Element-wise arithmetic**: `+`, `-`, `*`, `/` on `&Tensor` with identical shapes.
//! - **Broadcasting**: [`Tensor::broadcast_add`] and [`Tensor::broadcast_mul`] stretch size-1
//!   axes of the right-hand side across the left-hand side. This is how an attention bias of
//!   shape `[b, h, blocks, 1, memory]` reaches every query row.
//! - **Layout**: [`Tensor::permute`], [`Tensor::pad`], [`Tensor::slice`], and
//!   [`TensorOps::transpose`] for the last two axes.
//! - **Compute**: batched [`Tensor::matmul`], [`Tensor::conv2d`] and a last-axis
//!   [`Tensor::softmax`].
//!
//! # Broadcasting
//!
//! Both operands have the same rank. Every right-hand axis must either match the left-hand
//! axis or be 1; the result always has the left-hand shape.
//!
//! > [!NOTE]
//! > Operations are parallelised with `rayon` and allocate a fresh output tensor. Nothing
//! > here mutates its inputs.
//!
//! ```rust
//! use transcribe_rs::tensor::Tensor;
//!
//! let logits = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap();
//! let mask = Tensor::<f32, 2>::new(vec![0.0, -1e9], [1, 2]).unwrap();
//!
//! let masked = logits.broadcast_add(&mask).unwrap();
//! assert_eq!(masked.data(), &[1.0, 2.0 - 1e9, 3.0, 4.0 - 1e9]);
//! ```

use super::{Cpu, Device, Result, Tensor, TensorElem, TensorError};

use num_traits::Float;
use rayon::prelude::*;
use std::ops::{Add, Div, Mul, Sub};

/// Implements a binary arithmetic operator for `&Tensor` with strict shape checking.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident) => {
        impl<T, const RANK: usize> $trait for &Tensor<T, RANK, Cpu>
        where
            T: TensorElem,
        {
            type Output = crate::tensor::Result<Tensor<T, RANK, Cpu>>;

            fn $method(self, rhs: Self) -> Self::Output {
                if self.shape != rhs.shape {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: rhs.shape.to_vec(),
                    });
                }

                let mut out = Tensor::zeros(self.shape);
                out.data
                    .par_iter_mut()
                    .zip(self.data.par_iter())
                    .zip(rhs.data.par_iter())
                    .for_each(|((o, a), b)| {
                        *o = a.$method(*b);
                    });

                Ok(out)
            }
        }
    };
}

impl_bin_op!(Add, add);
impl_bin_op!(Sub, sub);
impl_bin_op!(Mul, mul);
impl_bin_op!(Div, div);

/// Operations whose implementation depends on the device.
pub trait TensorOps<T: TensorElem, const RANK: usize> {
    type Device;

    /// Swaps the last two axes.
    fn transpose(&self) -> Result<Tensor<T, RANK, <Self as HasDevice>::Device>>
    where
        Self: HasDevice,
        <Self as HasDevice>::Device: Device;
}

/// Helper trait to name a tensor's device type.
pub trait HasDevice {
    type Device;
}

impl<T: TensorElem, const RANK: usize, D: Device> HasDevice for Tensor<T, RANK, D> {
    type Device = D;
}

impl<T, const RANK: usize, D: Device> TensorOps<T, RANK> for Tensor<T, RANK, D>
where
    T: TensorElem,
{
    type Device = D;

    fn transpose(&self) -> Result<Tensor<T, RANK, <Self as HasDevice>::Device>> {
        let data = D::transpose(&self.data, &self.shape)?;

        let mut shape = self.shape;
        if RANK >= 2 {
            shape.swap(RANK - 1, RANK - 2);
        }

        Ok(Tensor {
            shape,
            strides: crate::tensor::compute_strides(&shape),
            data,
            device: self.device.clone(),
        })
    }
}

/// Splits a flat row-major offset into per-axis coordinates.
#[inline]
fn unravel<const RANK: usize>(mut offset: usize, strides: &[usize; RANK]) -> [usize; RANK] {
    let mut coords = [0; RANK];
    for (c, &s) in coords.iter_mut().zip(strides) {
        *c = offset / s;
        offset %= s;
    }
    coords
}

impl<T, const RANK: usize> Tensor<T, RANK, Cpu>
where
    T: TensorElem,
{
    fn from_parts(shape: [usize; RANK], data: Vec<T>) -> Self {
        Tensor {
            shape,
            strides: crate::tensor::compute_strides(&shape),
            data,
            device: Cpu,
        }
    }

    /// Applies `f` to every element.
    ///
    /// ```rust
    /// use transcribe_rs::tensor::Tensor;
    /// let t = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
    /// assert_eq!(t.map(|x| x * x).data(), &[1.0, 4.0, 9.0]);
    /// ```
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        let mut out = Tensor::zeros(self.shape);
        out.data
            .par_iter_mut()
            .zip(self.data.par_iter())
            .for_each(|(o, i)| *o = f(*i));
        out
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: T) -> Self {
        self.map(|x| x * factor)
    }

    /// Adds `rhs`, stretching its size-1 axes over `self`.
    pub fn broadcast_add(&self, rhs: &Self) -> Result<Self> {
        self.broadcast_zip(rhs, |a, b| a + b)
    }

    /// Multiplies by `rhs`, stretching its size-1 axes over `self`.
    pub fn broadcast_mul(&self, rhs: &Self) -> Result<Self> {
        self.broadcast_zip(rhs, |a, b| a * b)
    }

    fn broadcast_zip<F>(&self, rhs: &Self, f: F) -> Result<Self>
    where
        F: Fn(T, T) -> T + Sync + Send,
    {
        let mut rhs_strides = rhs.strides;
        for d in 0..RANK {
            if rhs.shape[d] == self.shape[d] {
                continue;
            }
            if rhs.shape[d] != 1 {
                return Err(TensorError::ShapeMismatch {
                    expected: self.shape.to_vec(),
                    got: rhs.shape.to_vec(),
                });
            }
            rhs_strides[d] = 0;
        }

        let mut out = Tensor::zeros(self.shape);
        let strides = self.strides;
        out.data
            .par_iter_mut()
            .zip(self.data.par_iter())
            .enumerate()
            .for_each(|(i, (o, &a))| {
                let coords = unravel(i, &strides);
                let j: usize = coords.iter().zip(&rhs_strides).map(|(c, s)| c * s).sum();
                *o = f(a, rhs.data[j]);
            });
        Ok(out)
    }

    /// Batched matrix multiplication over the last two axes.
    ///
    /// Leading axes are batch axes and must match exactly:
    /// `[..., M, K] x [..., K, N] -> [..., M, N]`.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        const { assert!(RANK >= 2, "Matmul requires rank >= 2") };

        let data = transcribe_rs_kernels::cpu_matmul(&self.data, &rhs.data, &self.shape, &rhs.shape)?;

        let mut shape = self.shape;
        shape[RANK - 1] = rhs.shape[RANK - 1];
        Ok(Self::from_parts(shape, data))
    }

    /// Reorders axes: output axis `i` is input axis `axes[i]`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` for an axis `>= RANK`, `ShapeMismatch` if `axes` repeats an axis.
    pub fn permute(&self, axes: [usize; RANK]) -> Result<Self> {
        let data = transcribe_rs_kernels::cpu_permute(&self.data, &self.shape, &axes)?;

        let mut shape = self.shape;
        for (dim, &axis) in shape.iter_mut().zip(&axes) {
            *dim = self.shape[axis];
        }
        Ok(Self::from_parts(shape, data))
    }

    /// Swaps axes `a` and `b`.
    pub fn transpose_axes(&self, a: usize, b: usize) -> Result<Self> {
        let mut axes: [usize; RANK] = std::array::from_fn(|i| i);
        if a >= RANK || b >= RANK {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![a, b],
                shape: self.shape.to_vec(),
            });
        }
        axes.swap(a, b);
        self.permute(axes)
    }

    /// Zero-pads every axis by `[before, after]` elements.
    pub fn pad(&self, paddings: [[usize; 2]; RANK]) -> Self {
        let mut shape = self.shape;
        for (dim, [before, after]) in shape.iter_mut().zip(paddings) {
            *dim += before + after;
        }
        if shape == self.shape {
            return self.clone();
        }

        let mut out = Tensor::zeros(shape);
        let out_strides = out.strides;
        let in_strides = self.strides;
        let in_shape = self.shape;
        out.data.par_iter_mut().enumerate().for_each(|(i, o)| {
            let coords = unravel(i, &out_strides);
            let mut src = 0;
            for d in 0..RANK {
                let [before, _] = paddings[d];
                if coords[d] < before || coords[d] >= before + in_shape[d] {
                    return;
                }
                src += (coords[d] - before) * in_strides[d];
            }
            *o = self.data[src];
        });
        out
    }

    /// Extracts the window starting at `begin` with extent `size`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` if the window reaches past the end of any axis.
    pub fn slice(&self, begin: [usize; RANK], size: [usize; RANK]) -> Result<Self> {
        for d in 0..RANK {
            if begin[d] + size[d] > self.shape[d] {
                return Err(TensorError::IndexOutOfBounds {
                    index: begin.iter().zip(&size).map(|(b, s)| b + s).collect(),
                    shape: self.shape.to_vec(),
                });
            }
        }

        let mut out = Tensor::zeros(size);
        let out_strides = out.strides;
        let in_strides = self.strides;
        out.data.par_iter_mut().enumerate().for_each(|(i, o)| {
            let coords = unravel(i, &out_strides);
            let src: usize = (0..RANK).map(|d| (coords[d] + begin[d]) * in_strides[d]).sum();
            *o = self.data[src];
        });
        Ok(out)
    }

    /// 2-D convolution in NCHW layout.
    ///
    /// # Arguments
    ///
    /// * `weight` - `[out_channels, in_channels, kernel_h, kernel_w]`.
    /// * `stride` - `[stride_h, stride_w]`.
    /// * `padding` - zero padding added to both sides `[pad_h, pad_w]`.
    /// * `dilation` - `[dil_h, dil_w]`.
    ///
    /// Output shape: `[batch, out_channels, out_h, out_w]`.
    pub fn conv2d(
        &self,
        weight: &Tensor<T, 4, Cpu>,
        stride: [usize; 2],
        padding: [usize; 2],
        dilation: [usize; 2],
    ) -> Result<Tensor<T, 4, Cpu>> {
        const { assert!(RANK == 4, "Conv2d requires rank 4 input") };

        let data = transcribe_rs_kernels::cpu_conv2d(
            &self.data,
            &weight.data,
            &self.shape,
            &weight.shape,
            stride,
            padding,
            dilation,
        )?;

        let out_len = |axis: usize| {
            transcribe_rs_kernels::cpu_conv2d::conv_output_len(
                self.shape[axis + 2],
                weight.shape[axis + 2],
                stride[axis],
                padding[axis],
                dilation[axis],
            )
            .unwrap_or(0)
        };
        let shape = [self.shape[0], weight.shape[0], out_len(0), out_len(1)];
        Tensor::new(data, shape)
    }
}

impl<T, const RANK: usize> Tensor<T, RANK, Cpu>
where
    T: TensorElem + Float,
{
    /// Numerically stable softmax over the last axis.
    ///
    /// Rows are shifted by their maximum before exponentiation, so a `-1e9` bias drives the
    /// matching weights to zero instead of overflowing.
    pub fn softmax(&self) -> Self {
        const { assert!(RANK >= 1, "Softmax requires rank >= 1") };

        let mut out = self.clone();
        crate::kernels::attention::softmax_rows(&mut out.data, self.shape[RANK - 1]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();

        assert_eq!((&a + &b).unwrap().data(), &[4.0, 6.0]);
        assert_eq!((&a * &b).unwrap().data(), &[3.0, 8.0]);
        assert_eq!((&b - &a).unwrap().data(), &[2.0, 2.0]);
        assert_eq!((&b / &a).unwrap().data(), &[3.0, 2.0]);

        let c = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        assert!(matches!(&a + &c, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_matmul_2d() {
        let a = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        let b = Tensor::<f32, 2>::new(vec![7.0, 8.0, 9.0, 1.0, 2.0, 3.0], [3, 2]).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        // 1*7 + 2*9 + 3*2 = 31, 1*8 + 2*1 + 3*3 = 19
        // 4*7 + 5*9 + 6*2 = 85, 4*8 + 5*1 + 6*3 = 55
        assert_eq!(c.data(), &[31.0, 19.0, 85.0, 55.0]);
    }

    #[test]
    fn test_matmul_block_batch() {
        // [batch=1, heads=1, blocks=2, query=1, depth=2] x [.., depth=2, memory=1]
        let q = Tensor::<f32, 5>::new(vec![1.0, 0.0, 0.0, 1.0], [1, 1, 2, 1, 2]).unwrap();
        let k = Tensor::<f32, 5>::new(vec![5.0, 6.0, 7.0, 8.0], [1, 1, 2, 2, 1]).unwrap();

        let logits = q.matmul(&k).unwrap();
        assert_eq!(logits.shape(), &[1, 1, 2, 1, 1]);
        assert_eq!(logits.data(), &[5.0, 8.0]);

        let other = Tensor::<f32, 5>::zeros([1, 1, 3, 2, 1]);
        assert!(matches!(q.matmul(&other), Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();

        let t_t = t.transpose().unwrap();
        assert_eq!(t_t.shape(), &[3, 2]);
        assert_eq!(t_t.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_const_transpose_via_trait() {
        use crate::tensor::ConstDevice;

        let t: Tensor<f32, 2, ConstDevice<4>> = Tensor::new_const([1.0, 2.0, 3.0, 4.0], [2, 2]);
        let t_t = t.transpose().unwrap();
        assert_eq!(t_t.data(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_permute() {
        // [B=1, S=2, H=2, D=2] -> [B, H, S, D]
        let data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let t = Tensor::<f32, 4>::new(data, [1, 2, 2, 2]).unwrap();

        let permuted = t.permute([0, 2, 1, 3]).unwrap();
        assert_eq!(permuted.shape(), &[1, 2, 2, 2]);
        assert_eq!(permuted.data(), &[0.0, 1.0, 4.0, 5.0, 2.0, 3.0, 6.0, 7.0]);

        let err = t.permute([0, 1, 1, 3]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));

        let swapped = t.transpose_axes(1, 2).unwrap();
        assert_eq!(swapped.data(), permuted.data());
        assert!(t.transpose_axes(0, 4).is_err());
    }

    #[test]
    fn test_pad_and_slice_are_inverse() {
        let t = Tensor::<i32, 2>::new(vec![1, 2, 3, 4], [2, 2]).unwrap();

        let padded = t.pad([[1, 0], [1, 2]]);
        assert_eq!(padded.shape(), &[3, 5]);
        // 0 0 0 0 0
        // 0 1 2 0 0
        // 0 3 4 0 0
        assert_eq!(padded.data(), &[0, 0, 0, 0, 0, 0, 1, 2, 0, 0, 0, 3, 4, 0, 0]);

        let cropped = padded.slice([1, 1], [2, 2]).unwrap();
        assert_eq!(cropped.data(), t.data());

        let err = padded.slice([2, 0], [2, 1]);
        assert!(matches!(err, Err(TensorError::IndexOutOfBounds { .. })));
    }

    #[test]
    fn test_broadcast_over_query_axis() {
        // logits [1, 2, 3] (two query rows), bias [1, 1, 3]
        let logits = Tensor::<f32, 3>::ones([1, 2, 3]);
        let bias = Tensor::<f32, 3>::new(vec![0.0, -1.0, -2.0], [1, 1, 3]).unwrap();

        let out = logits.broadcast_add(&bias).unwrap();
        assert_eq!(out.data(), &[1.0, 0.0, -1.0, 1.0, 0.0, -1.0]);

        let mask = Tensor::<f32, 3>::new(vec![2.0, 0.0], [1, 2, 1]).unwrap();
        let out = logits.broadcast_mul(&mask).unwrap();
        assert_eq!(out.data(), &[2.0, 2.0, 2.0, 0.0, 0.0, 0.0]);

        let bad = Tensor::<f32, 3>::ones([1, 1, 2]);
        assert!(matches!(
            logits.broadcast_add(&bad),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let t = Tensor::<f64, 2>::new(vec![1.0, 2.0, 3.0, 0.0, -1e9, 0.0], [2, 3]).unwrap();
        let s = t.softmax();

        let row0: f64 = s.data()[..3].iter().sum();
        assert!((row0 - 1.0).abs() < 1e-12);
        assert!((s.data()[3] - 0.5).abs() < 1e-12);
        assert!(s.data()[4].abs() < 1e-12);
    }

    #[test]
    fn test_conv2d_shape() {
        let x = Tensor::<f32, 4>::ones([2, 1, 4, 6]);
        let w = Tensor::<f32, 4>::ones([3, 1, 2, 2]);

        let y = x.conv2d(&w, [2, 2], [0, 0], [1, 1]).unwrap();
        assert_eq!(y.shape(), &[2, 3, 2, 3]);
        assert!(y.data().iter().all(|&v| v == 4.0));
    }
}
