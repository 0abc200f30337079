use crate::attention::blocks::{
    embedding_to_padding, gather_blocks_2d, gather_indices_2d, scatter_blocks_2d,
};
use crate::attention::dot_product::{AttentionWeights, DotProductAttention};
use crate::tensor::{Cpu, HasDType, Result, Tensor, TensorError, pad_to_multiple_2d};
use log::debug;
use num_traits::Float;

/// Bias applied to logits of padding keys.
pub const PADDING_BIAS: f64 = -1e9;

/// [`PADDING_BIAS`], clamped to the lowest finite value of `T`.
fn padding_bias<T: Float>() -> T {
    <T as num_traits::NumCast>::from(PADDING_BIAS)
        .filter(|b| b.is_finite())
        .unwrap_or_else(T::min_value)
}

/// Block-local self-attention over `[batch, heads, height, width, depth]` maps.
///
/// Every `query_shape` block of queries attends to the keys and values of the same block
/// widened by `memory_flange` on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAttention2d {
    query_shape: [usize; 2],
    memory_flange: [usize; 2],
    attention: DotProductAttention,
}

impl Default for LocalAttention2d {
    fn default() -> Self {
        Self::new([8, 16], [8, 16])
    }
}

impl LocalAttention2d {
    pub fn new(query_shape: [usize; 2], memory_flange: [usize; 2]) -> Self {
        Self {
            query_shape,
            memory_flange,
            attention: DotProductAttention::default().with_name("local_attention_2d"),
        }
    }

    /// Replaces the per-block attention (dropout, precision, name).
    pub fn with_attention(mut self, attention: DotProductAttention) -> Self {
        self.attention = attention;
        self
    }

    pub fn attention(&self) -> &DotProductAttention {
        &self.attention
    }

    pub fn query_shape(&self) -> [usize; 2] {
        self.query_shape
    }

    pub fn memory_flange(&self) -> [usize; 2] {
        self.memory_flange
    }

    /// `query_shape + 2 * memory_flange`.
    pub fn memory_shape(&self) -> [usize; 2] {
        [
            self.query_shape[0] + 2 * self.memory_flange[0],
            self.query_shape[1] + 2 * self.memory_flange[1],
        ]
    }

    /// Runs local attention. The output has `v`'s depth and `v`'s original spatial size.
    pub fn forward<T>(
        &self,
        q: &Tensor<T, 5, Cpu>,
        k: &Tensor<T, 5, Cpu>,
        v: &Tensor<T, 5, Cpu>,
    ) -> Result<Tensor<T, 5, Cpu>>
    where
        T: HasDType + Float,
    {
        self.forward_with_weights(q, k, v, None)
    }

    /// Like [`Self::forward`], also recording per-block weights and logits into `sink`.
    pub fn forward_with_weights<T>(
        &self,
        q: &Tensor<T, 5, Cpu>,
        k: &Tensor<T, 5, Cpu>,
        v: &Tensor<T, 5, Cpu>,
        sink: Option<&mut AttentionWeights<T, 5>>,
    ) -> Result<Tensor<T, 5, Cpu>>
    where
        T: HasDType + Float,
    {
        if k.shape()[..4] != v.shape()[..4] {
            return Err(TensorError::ShapeMismatch {
                expected: k.shape().to_vec(),
                got: v.shape().to_vec(),
            });
        }

        let [batch, heads, height, width, depth_v] = *v.shape();
        let [flange_h, flange_w] = self.memory_flange;

        let q = pad_to_multiple_2d(q, self.query_shape)?;
        let flange = [[0, 0], [0, 0], [flange_h, flange_h], [flange_w, flange_w], [0, 0]];
        let k = pad_to_multiple_2d(k, self.query_shape)?.pad(flange);
        let v = pad_to_multiple_2d(v, self.query_shape)?.pad(flange);

        let query_indices = gather_indices_2d(&q, self.query_shape, self.query_shape)?;
        let q_blocks = gather_blocks_2d(&q, &query_indices)?;

        let memory_indices = gather_indices_2d(&k, self.memory_shape(), self.query_shape)?;
        let k_blocks = gather_blocks_2d(&k, &memory_indices)?;
        let v_blocks = gather_blocks_2d(&v, &memory_indices)?;

        let [_, _, num_blocks, memory_area, _] = *k_blocks.shape();
        debug!(
            "local_attention_2d: {} query blocks of {:?}, memory {:?}",
            num_blocks,
            self.query_shape,
            self.memory_shape()
        );

        // [b, h, blocks, memory_area, 1] -> [b, h, blocks, 1, memory_area]
        let bias = embedding_to_padding(&k_blocks)
            .scale(padding_bias::<T>())
            .reshape([batch, heads, num_blocks, 1, memory_area])?;

        let output = self
            .attention
            .forward(&q_blocks, &k_blocks, &v_blocks, Some(&bias), sink)?;

        let [_, _, padded_h, padded_w, _] = *q.shape();
        let output = scatter_blocks_2d(
            &output,
            &query_indices,
            [batch, heads, padded_h, padded_w, depth_v],
        )?;
        output.slice([0; 5], [batch, heads, height, width, depth_v])
    }
}

/// Block-local 2-D attention with default dot-product settings.
///
/// Equivalent to `LocalAttention2d::new(query_shape, memory_flange).forward(q, k, v)`.
pub fn local_attention_2d<T>(
    q: &Tensor<T, 5, Cpu>,
    k: &Tensor<T, 5, Cpu>,
    v: &Tensor<T, 5, Cpu>,
    query_shape: [usize; 2],
    memory_flange: [usize; 2],
) -> Result<Tensor<T, 5, Cpu>>
where
    T: HasDType + Float,
{
    LocalAttention2d::new(query_shape, memory_flange).forward(q, k, v)
}
