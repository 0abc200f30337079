use crate::attention::{AttentionWeights, LocalAttention2d};
use crate::nn::Module;
use crate::tensor::{
    Cpu, HasDType, Result, Tensor, TensorError, combine_heads_2d, shape_list, split_heads_2d,
};
use num_traits::Float;

/// Multi-head local self-attention over `[batch, height, width, channels]` feature maps.
///
/// Channels are split into `num_heads` heads, each head attends within its local 2-D
/// neighbourhood with `q = k = v`, and the heads are concatenated back.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSelfAttention2d {
    num_heads: usize,
    channels: usize,
    attention: LocalAttention2d,
}

impl LocalSelfAttention2d {
    /// # Errors
    ///
    /// `Unsupported` when `num_heads` is zero or does not divide `channels`.
    pub fn new(num_heads: usize, channels: usize, attention: LocalAttention2d) -> Result<Self> {
        if num_heads == 0 || channels % num_heads != 0 {
            return Err(TensorError::Unsupported(format!(
                "{} channels cannot be split into {} heads",
                channels, num_heads
            )));
        }
        Ok(Self {
            num_heads,
            channels,
            attention,
        })
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn attention(&self) -> &LocalAttention2d {
        &self.attention
    }

    pub fn forward<T>(&self, x: &Tensor<T, 4, Cpu>) -> Result<Tensor<T, 4, Cpu>>
    where
        T: HasDType + Float,
    {
        self.forward_with_weights(x, None)
    }

    /// Runs the layer, recording per-block weights into `sink` when given.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the channel axis of `x` is not `channels`.
    pub fn forward_with_weights<T>(
        &self,
        x: &Tensor<T, 4, Cpu>,
        sink: Option<&mut AttentionWeights<T, 5>>,
    ) -> Result<Tensor<T, 4, Cpu>>
    where
        T: HasDType + Float,
    {
        // Block partitioning only needs the channel count fixed up front.
        shape_list(x, &[None, None, None, Some(self.channels)])?;

        let heads = split_heads_2d(x.clone(), self.num_heads)?;
        let attended = self
            .attention
            .forward_with_weights(&heads, &heads, &heads, sink)?;
        combine_heads_2d(attended)
    }
}

impl<T: HasDType + Float> Module<T> for LocalSelfAttention2d {
    fn name(&self) -> &str {
        self.attention.attention().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_map_is_fixed_point() {
        let layer = LocalSelfAttention2d::new(2, 4, LocalAttention2d::new([2, 2], [1, 1])).unwrap();
        let x = Tensor::<f32, 4>::full([1, 3, 5, 4], 0.5);

        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape(), &[1, 3, 5, 4]);
        for &v in y.data() {
            assert!((v - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_records_weights_under_layer_name() {
        let layer = LocalSelfAttention2d::new(1, 2, LocalAttention2d::new([2, 2], [0, 0])).unwrap();
        let x = Tensor::<f32, 4>::ones([1, 2, 2, 2]);

        let mut sink = AttentionWeights::new();
        layer.forward_with_weights(&x, Some(&mut sink)).unwrap();
        assert_eq!(Module::<f32>::name(&layer), "local_attention_2d");
        assert!(sink.contains_key("local_attention_2d"));
        assert!(sink.contains_key("local_attention_2d/logits"));
    }

    #[test]
    fn test_rejects_bad_heads_and_channels() {
        assert!(LocalSelfAttention2d::new(3, 4, LocalAttention2d::default()).is_err());

        let layer = LocalSelfAttention2d::new(2, 4, LocalAttention2d::default()).unwrap();
        let x = Tensor::<f32, 4>::ones([1, 2, 2, 6]);
        assert!(matches!(
            layer.forward(&x),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }
}
