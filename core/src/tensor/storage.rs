//! Backing containers for tensor data.

use crate::tensor::TensorElem;
use std::fmt::Debug;

/// A contiguous, row-major element buffer.
///
/// `Vec<T>` backs CPU tensors and `[T; N]` backs `ConstDevice` tensors; kernels only ever see
/// the slice views.
pub trait Storage<T: TensorElem>: Clone + Debug + Send + Sync {
    fn as_slice(&self) -> &[T];
    fn as_mut_slice(&mut self) -> &mut [T];
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: TensorElem> Storage<T> for Vec<T> {
    fn as_slice(&self) -> &[T] {
        self
    }
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

impl<T: TensorElem, const N: usize> Storage<T> for [T; N] {
    fn as_slice(&self) -> &[T] {
        self
    }
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
    fn len(&self) -> usize {
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_storage() {
        let mut storage = vec![0.5f32, 0.25];
        storage.as_mut_slice()[1] = 1.0;
        assert_eq!(Storage::len(&storage), 2);
        assert_eq!(storage.as_slice(), &[0.5, 1.0]);
        assert!(!Storage::is_empty(&storage));
    }

    #[test]
    fn test_array_storage() {
        let storage = [0usize; 0];
        assert!(Storage::<usize>::is_empty(&storage));

        let storage = [1usize, 2, 3];
        assert_eq!(Storage::len(&storage), 3);
    }
}
