use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;

/// Batched matrix multiplication over the last two axes.
///
/// `lhs` is `[..., M, K]`, `rhs` is `[..., K, N]`, and the leading axes must agree. The
/// result is `[..., M, N]`.
///
/// The right-hand side is transposed once up front so that every output element is a dot
/// product of two contiguous rows. Output rows are distributed across the rayon pool.
pub fn cpu_matmul<T, const RANK: usize>(
    lhs_data: &[T],
    rhs_data: &[T],
    lhs_shape: &[usize; RANK],
    rhs_shape: &[usize; RANK],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    let m = lhs_shape[RANK - 2];
    let k = lhs_shape[RANK - 1];
    let n = rhs_shape[RANK - 1];

    if k != rhs_shape[RANK - 2] {
        return Err(KernelError::ShapeMismatch {
            expected: vec![k],
            got: vec![rhs_shape[RANK - 2]],
        });
    }
    if lhs_shape[..RANK - 2] != rhs_shape[..RANK - 2] {
        return Err(KernelError::ShapeMismatch {
            expected: lhs_shape[..RANK - 2].to_vec(),
            got: rhs_shape[..RANK - 2].to_vec(),
        });
    }
    check_len(lhs_data.len(), lhs_shape)?;
    check_len(rhs_data.len(), rhs_shape)?;

    let batch: usize = lhs_shape[..RANK - 2].iter().product();
    let mut out_data = vec![T::zero(); batch * m * n];
    if out_data.is_empty() {
        return Ok(out_data);
    }

    // [..., K, N] -> [..., N, K]
    let rhs_t = crate::cpu_transpose::cpu_transpose(rhs_data, rhs_shape)?;

    out_data
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(row, out_row)| {
            let b = row / m;
            let i = row % m;
            let a_start = b * m * k + i * k;
            let a_row = &lhs_data[a_start..a_start + k];

            for (j, out) in out_row.iter_mut().enumerate() {
                let b_start = b * n * k + j * k;
                let b_row = &rhs_t[b_start..b_start + k];
                let mut acc = T::zero();
                for (&x, &y) in a_row.iter().zip(b_row) {
                    acc += x * y;
                }
                *out = acc;
            }
        });

    Ok(out_data)
}
