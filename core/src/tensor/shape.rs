//! Shape helpers for block attention.
//!
//! Block partitioning needs concrete sizes, so every helper here works on the runtime
//! shape of a tensor. Where a caller wants to pin some axes at setup time, [`shape_list`]
//! checks the declared sizes against the runtime ones and reports which is which.

use crate::tensor::{Cpu, Device, Result, Tensor, TensorElem, TensorError};

/// One resolved dimension.
///
/// `Static` sizes were declared up front and verified; `Dynamic` sizes were only known once
/// the tensor arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Static(usize),
    Dynamic(usize),
}

impl Dim {
    pub fn get(self) -> usize {
        match self {
            Dim::Static(n) | Dim::Dynamic(n) => n,
        }
    }

    pub fn is_static(self) -> bool {
        matches!(self, Dim::Static(_))
    }
}

/// Resolves the shape of `x` against declared sizes.
///
/// `declared[i] = Some(n)` marks axis `i` as statically `n`; `None` leaves it dynamic.
///
/// # Errors
///
/// `ShapeMismatch` when a declared size disagrees with the runtime size.
pub fn shape_list<T, const RANK: usize, D>(
    x: &Tensor<T, RANK, D>,
    declared: &[Option<usize>; RANK],
) -> Result<[Dim; RANK]>
where
    T: TensorElem,
    D: Device,
{
    let mut dims = [Dim::Dynamic(0); RANK];
    for (i, (&actual, &want)) in x.shape().iter().zip(declared).enumerate() {
        dims[i] = match want {
            Some(n) if n == actual => Dim::Static(n),
            Some(n) => {
                let expected = declared
                    .iter()
                    .zip(x.shape())
                    .map(|(d, &a)| d.unwrap_or(a))
                    .collect();
                log::debug!("shape_list: axis {} declared {} but got {}", i, n, actual);
                return Err(TensorError::ShapeMismatch {
                    expected,
                    got: x.shape().to_vec(),
                });
            }
            None => Dim::Dynamic(actual),
        };
    }
    Ok(dims)
}

/// Replaces axes `[i, j)` with `new_shape`, keeping every other axis.
///
/// The rank arithmetic (`RANK - (j - i) + new_shape.len() == NEW_RANK`) is checked here;
/// the element count is checked by [`Tensor::reshape`].
pub fn reshape_range<T, const RANK: usize, const NEW_RANK: usize>(
    x: Tensor<T, RANK, Cpu>,
    i: usize,
    j: usize,
    new_shape: &[usize],
) -> Result<Tensor<T, NEW_RANK, Cpu>>
where
    T: TensorElem,
{
    if i > j || j > RANK {
        return Err(TensorError::IndexOutOfBounds {
            index: vec![i, j],
            shape: x.shape().to_vec(),
        });
    }
    if RANK - (j - i) + new_shape.len() != NEW_RANK {
        return Err(TensorError::Unsupported(format!(
            "reshape_range: replacing axes {}..{} of a rank {} tensor with {} axes cannot give rank {}",
            i,
            j,
            RANK,
            new_shape.len(),
            NEW_RANK
        )));
    }

    let old = *x.shape();
    let mut shape = [0; NEW_RANK];
    for (dst, &src) in shape
        .iter_mut()
        .zip(old[..i].iter().chain(new_shape).chain(&old[j..]))
    {
        *dst = src;
    }
    x.reshape(shape)
}

/// `[..., m] -> [..., n, m / n]`.
pub fn split_last_dimension<T, const RANK: usize, const NEW_RANK: usize>(
    x: Tensor<T, RANK, Cpu>,
    n: usize,
) -> Result<Tensor<T, NEW_RANK, Cpu>>
where
    T: TensorElem,
{
    let last = x.shape()[RANK - 1];
    if n == 0 || last % n != 0 {
        return Err(TensorError::ShapeMismatch {
            expected: vec![n],
            got: vec![last],
        });
    }
    reshape_range(x, RANK - 1, RANK, &[n, last / n])
}

/// `[..., a, b] -> [..., a * b]`.
pub fn combine_last_two_dimensions<T, const RANK: usize, const NEW_RANK: usize>(
    x: Tensor<T, RANK, Cpu>,
) -> Result<Tensor<T, NEW_RANK, Cpu>>
where
    T: TensorElem,
{
    let [a, b] = [x.shape()[RANK - 2], x.shape()[RANK - 1]];
    reshape_range(x, RANK - 2, RANK, &[a * b])
}

/// `[batch, height, width, channels] -> [batch, heads, height, width, channels / heads]`.
pub fn split_heads_2d<T: TensorElem>(
    x: Tensor<T, 4, Cpu>,
    num_heads: usize,
) -> Result<Tensor<T, 5, Cpu>> {
    let split: Tensor<T, 5, Cpu> = split_last_dimension(x, num_heads)?;
    split.permute([0, 3, 1, 2, 4])
}

/// Inverse of [`split_heads_2d`].
pub fn combine_heads_2d<T: TensorElem>(x: Tensor<T, 5, Cpu>) -> Result<Tensor<T, 4, Cpu>> {
    combine_last_two_dimensions(x.permute([0, 2, 3, 1, 4])?)
}

/// Zero-pads the two spatial axes at their end up to multiples of `block_shape`.
///
/// Rank 4 tensors are `[batch, height, width, depth]`; rank 5 tensors are
/// `[batch, heads, height, width, depth]`.
///
/// # Errors
///
/// `Unsupported` for any other rank or for a zero block dimension.
pub fn pad_to_multiple_2d<T, const RANK: usize>(
    x: &Tensor<T, RANK, Cpu>,
    block_shape: [usize; 2],
) -> Result<Tensor<T, RANK, Cpu>>
where
    T: TensorElem,
{
    let h_axis = match RANK {
        4 => 1,
        5 => 2,
        _ => {
            return Err(TensorError::Unsupported(format!(
                "pad_to_multiple_2d expects rank 4 or 5, got rank {}",
                RANK
            )));
        }
    };
    if block_shape.contains(&0) {
        return Err(TensorError::Unsupported(format!(
            "block shape {:?} has a zero dimension",
            block_shape
        )));
    }

    let mut paddings = [[0, 0]; RANK];
    for (k, &block) in block_shape.iter().enumerate() {
        let dim = x.shape()[h_axis + k];
        paddings[h_axis + k][1] = (block - dim % block) % block;
    }
    Ok(x.pad(paddings))
}
