use crate::tensor::TensorElem;
use num_traits::Float;
use rayon::prelude::*;

/// Below this many elements the row kernels run on the calling thread.
pub const PARALLEL_THRESHOLD: usize = 4096;

/// In-place softmax over consecutive rows of length `row_len`.
///
/// Each row is shifted by its maximum first. A row whose entries are all `-inf` becomes
/// all zeros rather than NaN.
pub fn softmax_rows<T: Float + Send + Sync>(data: &mut [T], row_len: usize) {
    if row_len == 0 {
        return;
    }

    let softmax_fn = |row: &mut [T]| {
        let max = row.iter().fold(T::neg_infinity(), |m, &v| m.max(v));
        if max == T::neg_infinity() {
            row.iter_mut().for_each(|v| *v = T::zero());
            return;
        }

        let mut sum = T::zero();
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum = sum + *v;
        }
        for v in row.iter_mut() {
            *v = *v / sum;
        }
    };

    if data.len() >= PARALLEL_THRESHOLD {
        data.par_chunks_mut(row_len).for_each(softmax_fn);
    } else {
        data.chunks_mut(row_len).for_each(softmax_fn);
    }
}

/// Flags all-zero rows.
///
/// Writes 1 into `out[i]` when the absolute values of row `i` of `data` sum to exactly 0,
/// and 0 otherwise. A legitimately zero feature vector is therefore flagged too.
pub fn zero_rows<T: TensorElem>(data: &[T], row_len: usize, out: &mut [T]) {
    let flag_fn = |(row, flag): (&[T], &mut T)| {
        let magnitude: f64 = row
            .iter()
            .map(|v| v.to_f64().map_or(f64::NAN, f64::abs))
            .sum();
        *flag = if magnitude == 0.0 { T::one() } else { T::zero() };
    };

    if row_len == 0 {
        out.iter_mut().for_each(|flag| *flag = T::one());
        return;
    }

    if data.len() >= PARALLEL_THRESHOLD {
        data.par_chunks(row_len).zip(out.par_iter_mut()).for_each(flag_fn);
    } else {
        data.chunks(row_len).zip(out.iter_mut()).for_each(flag_fn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_rows() {
        let mut data = vec![0.0f32, 0.0, 1.0, 1.0, 1.0, 1.0];
        softmax_rows(&mut data, 2);
        assert_eq!(&data[..2], &[0.5, 0.5]);
        assert_eq!(&data[2..4], &[0.5, 0.5]);
    }

    #[test]
    fn test_softmax_large_negative_bias() {
        // Second key is masked with -1e9
        let mut data = vec![0.3f32, 0.3 - 1e9, 0.1];
        softmax_rows(&mut data, 3);
        assert!(data[1].abs() < 1e-12);
        assert!((data[0] + data[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_all_neg_inf_row() {
        let mut data = vec![f32::NEG_INFINITY; 4];
        softmax_rows(&mut data, 2);
        assert_eq!(data, vec![0.0; 4]);
    }

    #[test]
    fn test_softmax_parallel_path() {
        let mut data = vec![1.0f64; PARALLEL_THRESHOLD * 2];
        softmax_rows(&mut data, 8);
        assert!(data.iter().all(|&v| (v - 0.125).abs() < 1e-12));
    }

    #[test]
    fn test_zero_rows() {
        let data = vec![0.0, 0.0, 1.0, -1.0, 0.0, -0.0];
        let mut flags = vec![9.0; 3];
        zero_rows(&data, 2, &mut flags);
        // [0, 0] -> padding, [1, -1] -> sums to 2 in absolute value, [0, -0] -> padding
        assert_eq!(flags, vec![1.0, 0.0, 1.0]);
    }
}
