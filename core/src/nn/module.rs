use crate::tensor::TensorElem;
use std::fmt::Debug;

/// A layer that can be named in logs and model summaries.
///
/// `Send + Sync` lets a layer be shared across the rayon pool that runs its kernels.
pub trait Module<T: TensorElem>: Debug + Send + Sync {
    /// Layer name, also the key prefix for recorded attention weights.
    fn name(&self) -> &str;
}
