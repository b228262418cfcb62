// ============================================================
// Layer 5 — Sequence Pooling
// ============================================================
// Learnable pooling that replaces the ViT class token.
// Tokens carry unequal amounts of information, so instead of a
// fixed mean the layer learns one importance weight per token:
//
//   z = LN(x)                         [B, N, D]
//   w = softmax_N(Linear_D→A(z))      [B, N, A]   (over tokens)
//   y = flatten(wᵀ · z)               [B, A·D]
//
// With A = 1 this is a single attention-weighted average of the
// normalised tokens.

use burn::{
    nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

use crate::ml::settings::InitializerKind;

#[derive(Config, Debug)]
pub struct SeqPoolConfig {
    pub embedding_dim:      usize,
    /// Number of independent attention maps (A)
    #[config(default = 1)]
    pub attention_channels: usize,
    #[config(default = 1e-6)]
    pub layer_norm_epsilon: f64,
    #[config(default = "InitializerKind::GlorotUniform")]
    pub initializer:        InitializerKind,
}

impl SeqPoolConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SeqPool<B> {
        SeqPool {
            norm: LayerNormConfig::new(self.embedding_dim)
                .with_epsilon(self.layer_norm_epsilon)
                .init(device),
            attention: LinearConfig::new(self.embedding_dim, self.attention_channels)
                .with_initializer(self.initializer.to_initializer())
                .init(device),
        }
    }

    /// Width of the pooled output.
    pub fn output_dim(&self) -> usize {
        self.attention_channels * self.embedding_dim
    }
}

#[derive(Module, Debug)]
pub struct SeqPool<B: Backend> {
    pub norm:      LayerNorm<B>,
    pub attention: Linear<B>,
}

impl<B: Backend> SeqPool<B> {
    /// Per-token weights: [batch, tokens, D] → [batch, tokens, A], summing to 1 over tokens.
    pub fn weights(&self, normed: Tensor<B, 3>) -> Tensor<B, 3> {
        softmax(self.attention.forward(normed), 1)
    }

    /// x: [batch, tokens, D] → [batch, A·D]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let normed  = self.norm.forward(x);
        let weights = self.weights(normed.clone());
        // [B, A, N] · [B, N, D] → [B, A, D]
        weights.swap_dims(1, 2).matmul(normed).flatten::<2>(1, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let config = SeqPoolConfig::new(8).with_attention_channels(3);
        let pool   = config.init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([2, 5, 8], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(pool.forward(x).dims(), [2, config.output_dim()]);
    }

    #[test]
    fn test_weights_sum_to_one_over_tokens() {
        let device = Default::default();
        let pool = SeqPoolConfig::new(8).with_attention_channels(2).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([3, 7, 8], Distribution::Normal(0.0, 1.0), &device);
        let sums: Vec<f32> = pool.weights(x).sum_dim(1).into_data().to_vec().unwrap();
        assert_eq!(sums.len(), 3 * 2);
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_identical_tokens_pool_to_that_token() {
        // Whatever the weights, a convex combination of equal rows is that row
        let device = Default::default();
        let pool = SeqPoolConfig::new(4).init::<TestBackend>(&device);
        let token = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, -2.0, 0.5, 3.0], [1, 1, 4]),
            &device,
        );
        let x = token.clone().expand([1, 6, 4]);

        let pooled: Vec<f32> = pool.forward(x).into_data().to_vec().unwrap();
        let expected: Vec<f32> = pool.norm.forward(token).into_data().to_vec().unwrap();
        for (a, b) in pooled.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
