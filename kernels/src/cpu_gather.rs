//! Row gather and scatter-add over `[batch, rows, row_len]` buffers.
//!
//! Both kernels treat everything after the row axis as one contiguous row, which is how
//! block attention moves `[length, depth]` feature rows in and out of blocks.

use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;

/// Picks rows by index from every batch.
///
/// `shape` is `[batch, rows, row_len]`. The output is `[batch, indices.len(), row_len]`,
/// with output row `i` a copy of input row `indices[i]`. Repeated indices are allowed.
pub fn cpu_gather_rows<T: KernelElem>(
    data: &[T],
    shape: [usize; 3],
    indices: &[usize],
) -> Result<Vec<T>> {
    check_len(data.len(), &shape)?;
    let [batch, rows, row_len] = shape;

    if let Some(&bad) = indices.iter().find(|&&i| i >= rows) {
        return Err(KernelError::IndexOutOfBounds {
            index: bad,
            len: rows,
        });
    }

    let per_batch = indices.len() * row_len;
    let mut out = vec![T::zero(); batch * per_batch];
    if out.is_empty() {
        return Ok(out);
    }

    out.par_chunks_mut(per_batch)
        .enumerate()
        .for_each(|(b, out_batch)| {
            let src = &data[b * rows * row_len..(b + 1) * rows * row_len];
            for (dst, &row) in out_batch.chunks_mut(row_len).zip(indices) {
                dst.copy_from_slice(&src[row * row_len..(row + 1) * row_len]);
            }
        });

    Ok(out)
}

/// Adds rows back into a zero-initialised `[batch, target_rows, row_len]` buffer.
///
/// `shape` is the shape of `updates`, `[batch, indices.len(), row_len]`. Rows that map to
/// the same target position are summed.
pub fn cpu_scatter_add_rows<T: KernelElem>(
    updates: &[T],
    shape: [usize; 3],
    indices: &[usize],
    target_rows: usize,
) -> Result<Vec<T>> {
    check_len(updates.len(), &shape)?;
    let [batch, rows, row_len] = shape;

    if rows != indices.len() {
        return Err(KernelError::ShapeMismatch {
            expected: vec![indices.len()],
            got: vec![rows],
        });
    }
    if let Some(&bad) = indices.iter().find(|&&i| i >= target_rows) {
        return Err(KernelError::IndexOutOfBounds {
            index: bad,
            len: target_rows,
        });
    }

    let per_batch = target_rows * row_len;
    let mut out = vec![T::zero(); batch * per_batch];
    if out.is_empty() {
        return Ok(out);
    }

    out.par_chunks_mut(per_batch)
        .enumerate()
        .for_each(|(b, out_batch)| {
            let src = &updates[b * rows * row_len..(b + 1) * rows * row_len];
            for (src_row, &row) in src.chunks(row_len).zip(indices) {
                let dst = &mut out_batch[row * row_len..(row + 1) * row_len];
                for (d, &s) in dst.iter_mut().zip(src_row) {
                    *d += s;
                }
            }
        });

    Ok(out)
}
