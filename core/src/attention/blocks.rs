//! Index maps and block gather/scatter.
//!
//! An index map is a `Tensor<usize, 2>` of shape `[num_blocks, block_area]`. Row `n` lists
//! the flattened `row * width + col` positions covered by block `n`, in row-major order
//! inside the block. Maps depend only on the spatial size, never on tensor values.

use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError, TensorOps};
use log::debug;

/// Builds the index map of `block_shape` windows placed every `block_stride` positions.
///
/// The map is produced by convolving a `[1, 1, H, W]` grid holding `0..H*W` with a bank of
/// one-hot kernels, one per position inside the block. Output channel `i` at window `n` is
/// then exactly the linear position of cell `i` of block `n`.
///
/// With `block_stride == block_shape` and `H`, `W` multiples of the block, the map holds
/// `(H / bh) * (W / bw)` disjoint blocks covering the grid once.
///
/// # Errors
///
/// `Unsupported` for a zero block or stride dimension; `ShapeMismatch` when the block does
/// not fit inside the grid.
pub fn gather_indices_2d<T: TensorElem>(
    x: &Tensor<T, 5, Cpu>,
    block_shape: [usize; 2],
    block_stride: [usize; 2],
) -> Result<Tensor<usize, 2, Cpu>> {
    if block_shape.contains(&0) || block_stride.contains(&0) {
        return Err(TensorError::Unsupported(format!(
            "block shape {:?} and stride {:?} must be positive",
            block_shape, block_stride
        )));
    }

    let [_, _, height, width, _] = *x.shape();
    let [block_h, block_w] = block_shape;
    let area = block_h * block_w;

    // [area, 1, block_h, block_w], kernel i selects cell i
    let mut kernel = Tensor::<usize, 4>::zeros([area, 1, block_h, block_w]);
    for (i, cells) in kernel.data_mut().chunks_mut(area).enumerate() {
        cells[i] = 1;
    }

    let grid = Tensor::new((0..height * width).collect(), [1, 1, height, width])?;
    let windows = grid.conv2d(&kernel, block_stride, [0, 0], [1, 1])?;
    let [_, _, rows, cols] = *windows.shape();

    debug!(
        "gather_indices_2d: {}x{} grid, block {:?}, stride {:?} -> {} blocks",
        height,
        width,
        block_shape,
        block_stride,
        rows * cols
    );

    // [area, blocks] -> [blocks, area]
    windows.reshape([area, rows * cols])?.transpose()
}

/// Gathers blocks out of `[batch, heads, height, width, depth]`.
///
/// Returns `[batch, heads, num_blocks, block_area, depth]`. Overlapping index maps are fine;
/// shared positions are copied into every block that covers them.
pub fn gather_blocks_2d<T: TensorElem>(
    x: &Tensor<T, 5, Cpu>,
    indices: &Tensor<usize, 2, Cpu>,
) -> Result<Tensor<T, 5, Cpu>> {
    let [batch, heads, height, width, depth] = *x.shape();
    let [num_blocks, area] = *indices.shape();

    let data = transcribe_rs_kernels::cpu_gather_rows(
        x.data(),
        [batch * heads, height * width, depth],
        indices.data(),
    )?;
    Tensor::new(data, [batch, heads, num_blocks, area, depth])
}

/// Writes blocks back into a `target_shape` grid, the inverse of [`gather_blocks_2d`].
///
/// `x` is `[batch, heads, num_blocks, block_area, depth]` and `target_shape` is
/// `[batch, heads, height, width, depth]`. Positions covered by several blocks receive the
/// sum of their rows; positions covered by none stay zero. For a non-overlapping map that
/// covers the grid the round trip is exact.
pub fn scatter_blocks_2d<T: TensorElem>(
    x: &Tensor<T, 5, Cpu>,
    indices: &Tensor<usize, 2, Cpu>,
    target_shape: [usize; 5],
) -> Result<Tensor<T, 5, Cpu>> {
    let [batch, heads, num_blocks, area, depth] = *x.shape();
    let [t_batch, t_heads, height, width, t_depth] = target_shape;

    if [batch, heads, depth] != [t_batch, t_heads, t_depth] {
        return Err(TensorError::ShapeMismatch {
            expected: vec![batch, heads, height, width, depth],
            got: target_shape.to_vec(),
        });
    }
    if indices.shape() != &[num_blocks, area] {
        return Err(TensorError::ShapeMismatch {
            expected: vec![num_blocks, area],
            got: indices.shape().to_vec(),
        });
    }

    let data = transcribe_rs_kernels::cpu_scatter_add_rows(
        x.data(),
        [batch * heads, num_blocks * area, depth],
        indices.data(),
        height * width,
    )?;
    Tensor::new(data, target_shape)
}

/// Marks padding positions of an embedding.
///
/// The last axis collapses to size 1 and holds 1 where the absolute values along it sum to
/// exactly zero, 0 elsewhere. Any genuinely all-zero feature vector is treated as padding.
pub fn embedding_to_padding<T: TensorElem, const RANK: usize>(
    emb: &Tensor<T, RANK, Cpu>,
) -> Tensor<T, RANK, Cpu> {
    let mut shape = *emb.shape();
    let depth = shape[RANK - 1];
    shape[RANK - 1] = 1;

    let mut padding = Tensor::zeros(shape);
    crate::kernels::attention::zero_rows(emb.data(), depth, padding.data_mut());
    padding
}
