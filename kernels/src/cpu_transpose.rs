use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;

/// Swaps the last two axes of a row-major buffer.
///
/// The output is viewed as `batch * N` rows of length `M`; each row is filled from one
/// column of the matching input matrix.
pub fn cpu_transpose<T, const RANK: usize>(data: &[T], shape: &[usize; RANK]) -> Result<Vec<T>>
where
    T: KernelElem,
{
    if RANK < 2 {
        return Err(KernelError::ShapeMismatch {
            expected: vec![2],
            got: vec![RANK],
        });
    }
    check_len(data.len(), shape)?;

    let m = shape[RANK - 2];
    let n = shape[RANK - 1];
    let mut out_data = vec![T::zero(); data.len()];
    if out_data.is_empty() {
        return Ok(out_data);
    }

    out_data
        .par_chunks_mut(m)
        .enumerate()
        .for_each(|(row, out_row)| {
            let base = (row / n) * m * n;
            let col = row % n;
            for (r, out) in out_row.iter_mut().enumerate() {
                *out = data[base + r * n + col];
            }
        });

    Ok(out_data)
}

/// Reorders the axes of a row-major buffer.
///
/// Output axis `i` is input axis `axes[i]`, so `axes = [0, 3, 1, 2, 4]` turns
/// `[b, H, W, heads, c]` into `[b, heads, H, W, c]`. `axes` must be a permutation of
/// `0..RANK`.
pub fn cpu_permute<T, const RANK: usize>(
    data: &[T],
    shape: &[usize; RANK],
    axes: &[usize; RANK],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    check_len(data.len(), shape)?;

    let mut seen = [false; RANK];
    for &axis in axes {
        if axis >= RANK {
            return Err(KernelError::IndexOutOfBounds {
                index: axis,
                len: RANK,
            });
        }
        if seen[axis] {
            return Err(KernelError::ShapeMismatch {
                expected: (0..RANK).collect(),
                got: axes.to_vec(),
            });
        }
        seen[axis] = true;
    }

    let in_strides = row_major_strides(shape);
    let mut out_shape = [0; RANK];
    let mut gather_strides = [0; RANK];
    for (i, &axis) in axes.iter().enumerate() {
        out_shape[i] = shape[axis];
        gather_strides[i] = in_strides[axis];
    }

    let mut out_data = vec![T::zero(); data.len()];
    if out_data.is_empty() || RANK == 0 {
        out_data.copy_from_slice(data);
        return Ok(out_data);
    }

    let inner = out_shape[RANK - 1];
    let out_strides = row_major_strides(&out_shape);

    out_data
        .par_chunks_mut(inner)
        .enumerate()
        .for_each(|(row, out_row)| {
            let mut rem = row * inner;
            let mut base = 0;
            for d in 0..RANK - 1 {
                base += (rem / out_strides[d]) * gather_strides[d];
                rem %= out_strides[d];
            }
            let step = gather_strides[RANK - 1];
            for (j, out) in out_row.iter_mut().enumerate() {
                *out = data[base + j * step];
            }
        });

    Ok(out_data)
}

fn row_major_strides<const RANK: usize>(shape: &[usize; RANK]) -> [usize; RANK] {
    let mut strides = [1; RANK];
    for i in (0..RANK.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_simple() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let result = cpu_transpose(&data, &[2, 3]).unwrap();
        // [1, 4]
        // [2, 5]
        // [3, 6]
        assert_eq!(result, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_batch() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];

        let result = cpu_transpose(&data, &[2, 2, 2]).unwrap();
        assert_eq!(result, vec![1.0, 3.0, 2.0, 4.0, 5.0, 7.0, 6.0, 8.0]);
    }

    #[test]
    fn test_permute_matches_transpose() {
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let shape = [2, 3, 4];

        let permuted = cpu_permute(&data, &shape, &[0, 2, 1]).unwrap();
        let transposed = cpu_transpose(&data, &shape).unwrap();
        assert_eq!(permuted, transposed);
    }

    #[test]
    fn test_permute_moves_heads_forward() {
        // [1, 2, 1, 2, 1]: (h=2, w=1, heads=2, c=1) -> [1, heads, h, w, c]
        let data = vec![0, 1, 2, 3];
        let permuted = cpu_permute(&data, &[1, 2, 1, 2, 1], &[0, 3, 1, 2, 4]).unwrap();
        // head 0 collects positions (0, 0) and (1, 0): values 0, 2
        assert_eq!(permuted, vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_permute_rejects_bad_axes() {
        let data = vec![0.0; 4];
        assert!(matches!(
            cpu_permute(&data, &[2, 2], &[0, 0]),
            Err(KernelError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            cpu_permute(&data, &[2, 2], &[0, 2]),
            Err(KernelError::IndexOutOfBounds { index: 2, len: 2 })
        ));
    }
}
