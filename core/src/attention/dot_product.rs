//! Dot-product attention with bias, dropout and mixed precision.
//!
//! ```text
//! logits  = q · kᵀ (+ bias)
//! weights = softmax(logits)            -- in f32 when mixed precision is enabled
//! output  = dropout(weights) · v
//! ```
//!
//! All leading axes are batch axes, so the same code serves `[batch, heads, len, depth]`
//! sequences and `[batch, heads, blocks, area, depth]` block batches.
//!
//! > [!NOTE]
//! > Logits are not divided by `sqrt(depth)`. Callers that want scaled attention scale `q`
//! > first.

use crate::tensor::{
    Cpu, HasDType, MixedPrecision, Result, Tensor, TensorElem, TensorError, TensorOps, cast,
    cast_like,
};
use log::debug;
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Sink for attention weights and logits, keyed by operation name.
pub type AttentionWeights<T, const RANK: usize> = HashMap<String, Tensor<T, RANK, Cpu>>;

/// Configuration of one dot-product attention operation.
///
/// ```rust
/// use transcribe_rs::attention::DotProductAttention;
///
/// // Dropout shared across heads (axis 1), deterministic mask
/// let attention = DotProductAttention::new(0.1)
///     .with_broadcast_dims([1])
///     .with_seed(7)
///     .with_name("encoder/self_attention");
/// assert_eq!(attention.name(), "encoder/self_attention");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DotProductAttention {
    dropout_rate: f64,
    broadcast_dims: Vec<isize>,
    precision: Option<MixedPrecision>,
    name: String,
    seed: Option<u64>,
}

impl Default for DotProductAttention {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl DotProductAttention {
    pub const DEFAULT_NAME: &'static str = "dot_product_attention";

    pub fn new(dropout_rate: f64) -> Self {
        Self {
            dropout_rate,
            broadcast_dims: Vec::new(),
            precision: None,
            name: Self::DEFAULT_NAME.to_string(),
            seed: None,
        }
    }

    /// Axes along which one dropout decision is shared. Negative values count from the end.
    pub fn with_broadcast_dims(mut self, dims: impl IntoIterator<Item = isize>) -> Self {
        self.broadcast_dims = dims.into_iter().collect();
        self
    }

    /// Overrides the precision policy. By default activations are the element type and
    /// weights are `f32`.
    pub fn with_precision(mut self, precision: MixedPrecision) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Seeds the dropout mask so repeated calls drop the same entries.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout_rate
    }

    /// Runs attention.
    ///
    /// * `q` - `[..., len_q, depth]`
    /// * `k` - `[..., len_kv, depth]`
    /// * `v` - `[..., len_kv, depth_v]`
    /// * `bias` - added to the `[..., len_q, len_kv]` logits after a cast to `T`; size-1
    ///   axes broadcast.
    /// * `sink` - receives the weights under [`Self::name`] and the logits under
    ///   `"{name}/logits"`, both before dropout.
    ///
    /// Shape errors surface from the underlying matmul and broadcast.
    pub fn forward<T, B, const RANK: usize>(
        &self,
        q: &Tensor<T, RANK, Cpu>,
        k: &Tensor<T, RANK, Cpu>,
        v: &Tensor<T, RANK, Cpu>,
        bias: Option<&Tensor<B, RANK, Cpu>>,
        sink: Option<&mut AttentionWeights<T, RANK>>,
    ) -> Result<Tensor<T, RANK, Cpu>>
    where
        T: HasDType + Float,
        B: TensorElem + 'static,
    {
        let mut logits = q.matmul(&k.transpose()?)?;
        if let Some(bias) = bias {
            let bias = cast_like(bias.clone(), &logits)?;
            logits = logits.broadcast_add(&bias)?;
        }

        let precision = self
            .precision
            .unwrap_or_else(MixedPrecision::for_activation::<T>);
        let weights = if precision.is_enabled() {
            debug!("{}: softmax upcast to f32", self.name);
            let wide: Tensor<f32, RANK, Cpu> = cast(logits.clone())?;
            cast_like(wide.softmax(), q)?
        } else {
            logits.softmax()
        };

        if let Some(sink) = sink {
            sink.insert(self.name.clone(), weights.clone());
            sink.insert(format!("{}/logits", self.name), logits);
        }

        let weights = if self.dropout_rate > 0.0 {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            dropout_with_broadcast_dims(
                &weights,
                1.0 - self.dropout_rate,
                &self.broadcast_dims,
                &mut rng,
            )?
        } else {
            weights
        };

        weights.matmul(v)
    }
}

/// Dot-product attention with default settings and the given dropout rate.
pub fn dot_product_attention<T, B, const RANK: usize>(
    q: &Tensor<T, RANK, Cpu>,
    k: &Tensor<T, RANK, Cpu>,
    v: &Tensor<T, RANK, Cpu>,
    bias: Option<&Tensor<B, RANK, Cpu>>,
    dropout_rate: f64,
) -> Result<Tensor<T, RANK, Cpu>>
where
    T: HasDType + Float,
    B: TensorElem + 'static,
{
    DotProductAttention::new(dropout_rate).forward(q, k, v, bias, None)
}

/// Inverted dropout whose mask is shared along `broadcast_dims`.
///
/// Each kept entry is scaled by `1 / keep_prob`. The mask has size 1 on every broadcast
/// axis, so for `broadcast_dims = [1]` all heads drop the same attention weights.
///
/// # Errors
///
/// `Unsupported` when `keep_prob` is outside `(0, 1]`; `IndexOutOfBounds` for an axis
/// outside `-RANK..RANK`.
pub fn dropout_with_broadcast_dims<T, R, const RANK: usize>(
    x: &Tensor<T, RANK, Cpu>,
    keep_prob: f64,
    broadcast_dims: &[isize],
    rng: &mut R,
) -> Result<Tensor<T, RANK, Cpu>>
where
    T: TensorElem,
    R: Rng + ?Sized,
{
    if !(keep_prob > 0.0 && keep_prob <= 1.0) {
        return Err(TensorError::Unsupported(format!(
            "keep_prob must be in (0, 1], got {}",
            keep_prob
        )));
    }
    if keep_prob == 1.0 {
        return Ok(x.clone());
    }

    let mut noise_shape = *x.shape();
    for &dim in broadcast_dims {
        let axis = if dim < 0 { RANK as isize + dim } else { dim };
        if axis < 0 || axis >= RANK as isize {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![dim.unsigned_abs()],
                shape: x.shape().to_vec(),
            });
        }
        noise_shape[axis as usize] = 1;
    }

    let scale = T::from_f64(1.0 / keep_prob).ok_or_else(|| {
        TensorError::Unsupported(format!("1 / {} does not fit the element type", keep_prob))
    })?;
    let size: usize = noise_shape.iter().product();
    let mask: Vec<T> = (0..size)
        .map(|_| {
            if rng.random_bool(keep_prob) {
                scale
            } else {
                T::zero()
            }
        })
        .collect();

    x.broadcast_mul(&Tensor::new(mask, noise_shape)?)
}
