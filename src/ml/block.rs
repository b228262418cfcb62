// ============================================================
// Layer 5 — Transformer Encoder Block
// ============================================================
// Pre-norm encoder block with stochastic depth on both residual
// branches:
//
//   x = x + DropPath(Dropout(MHA(LN1(x))))
//   x = x + DropPath(MLP(LN2(x)))
//
//   MLP = Linear(D → D·r) → GELU → Dropout → Linear(D·r → D) → Dropout
//
// DropPath zeroes the whole residual branch of a sample during
// training and rescales the survivors by 1/(1-p), so the expected
// activation is unchanged. At inference it is the identity.
//
// Reference: Huang et al. (2016) Deep Networks with Stochastic Depth

use anyhow::Result;
use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation::gelu, Distribution},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::ml::settings::InitializerKind;

/// How the stochastic depth rate is spread across the blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StochasticDepthSchedule {
    /// Every block uses the full rate
    Uniform,
    /// Rate grows linearly from 0 (first block) to the full rate (last block)
    Linear,
}

impl StochasticDepthSchedule {
    /// Drop-path rate for block `index` out of `num_blocks`.
    pub fn rate_for(self, rate: f64, index: usize, num_blocks: usize) -> f64 {
        match self {
            Self::Uniform => rate,
            Self::Linear if num_blocks <= 1 => 0.0,
            Self::Linear => rate * index as f64 / (num_blocks - 1) as f64,
        }
    }
}

impl fmt::Display for StochasticDepthSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uniform => "uniform",
            Self::Linear  => "linear",
        })
    }
}

impl FromStr for StochasticDepthSchedule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" | "constant" => Ok(Self::Uniform),
            "linear"               => Ok(Self::Linear),
            other => anyhow::bail!("unknown stochastic depth schedule '{other}'"),
        }
    }
}

// ─── DropPath ─────────────────────────────────────────────────────────────────

#[derive(Module, Clone, Debug)]
pub struct DropPath {
    pub prob: f64,
}

impl DropPath {
    pub fn new(prob: f64) -> Self {
        Self { prob }
    }

    /// Drops whole samples of `input` along the batch dimension.
    ///
    /// Only active when the backend tracks gradients.
    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        if !B::ad_enabled() || self.prob <= 0.0 {
            return input;
        }
        let keep  = 1.0 - self.prob;
        let dims  = input.dims();
        let mut mask_shape = [1usize; D];
        mask_shape[0] = dims[0];

        let mask = Tensor::<B, D>::random(mask_shape, Distribution::Bernoulli(keep), &input.device())
            .expand(dims);
        input * mask / keep
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct TransformerBlockConfig {
    pub embedding_dim:      usize,
    pub num_heads:          usize,
    #[config(default = 3.0)]
    pub mlp_ratio:          f64,
    #[config(default = 0.1)]
    pub dropout:            f64,
    #[config(default = 0.1)]
    pub attention_dropout:  f64,
    #[config(default = 0.1)]
    pub drop_path:          f64,
    #[config(default = 1e-6)]
    pub layer_norm_epsilon: f64,
    #[config(default = "InitializerKind::GlorotUniform")]
    pub initializer:        InitializerKind,
}

impl TransformerBlockConfig {
    pub fn hidden_dim(&self) -> usize {
        ((self.embedding_dim as f64) * self.mlp_ratio).round().max(1.0) as usize
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> TransformerBlock<B> {
        let init   = self.initializer.to_initializer();
        let hidden = self.hidden_dim();

        let self_attn = MultiHeadAttentionConfig::new(self.embedding_dim, self.num_heads)
            .with_dropout(self.attention_dropout)
            .with_initializer(init.clone())
            .init(device);
        let mlp_linear1 = LinearConfig::new(self.embedding_dim, hidden)
            .with_initializer(init.clone())
            .init(device);
        let mlp_linear2 = LinearConfig::new(hidden, self.embedding_dim)
            .with_initializer(init)
            .init(device);
        let norm1 = LayerNormConfig::new(self.embedding_dim)
            .with_epsilon(self.layer_norm_epsilon)
            .init(device);
        let norm2 = LayerNormConfig::new(self.embedding_dim)
            .with_epsilon(self.layer_norm_epsilon)
            .init(device);

        TransformerBlock {
            self_attn,
            mlp_linear1,
            mlp_linear2,
            norm1,
            norm2,
            dropout:   DropoutConfig::new(self.dropout).init(),
            drop_path: DropPath::new(self.drop_path),
        }
    }
}

#[derive(Module, Debug)]
pub struct TransformerBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub mlp_linear1: Linear<B>,
    pub mlp_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
    pub drop_path:   DropPath,
}

impl<B: Backend> TransformerBlock<B> {
    /// x: [batch, tokens, D] → [batch, tokens, D]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let normed = self.norm1.forward(x.clone());
        let attn   = self.self_attn.forward(MhaInput::self_attn(normed)).context;
        let x = x + self.drop_path.forward(self.dropout.forward(attn));

        let normed = self.norm2.forward(x.clone());
        let hidden = self.dropout.forward(gelu(self.mlp_linear1.forward(normed)));
        let mlp    = self.dropout.forward(self.mlp_linear2.forward(hidden));
        x + self.drop_path.forward(mlp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;
    type TrainBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_uniform_schedule() {
        let s = StochasticDepthSchedule::Uniform;
        assert_eq!(s.rate_for(0.1, 0, 4), 0.1);
        assert_eq!(s.rate_for(0.1, 3, 4), 0.1);
    }

    #[test]
    fn test_linear_schedule() {
        let s = StochasticDepthSchedule::Linear;
        assert_eq!(s.rate_for(0.3, 0, 4), 0.0);
        assert!((s.rate_for(0.3, 1, 4) - 0.1).abs() < 1e-12);
        assert!((s.rate_for(0.3, 3, 4) - 0.3).abs() < 1e-12);
        assert_eq!(s.rate_for(0.3, 0, 1), 0.0);
    }

    #[test]
    fn test_drop_path_is_identity_without_autodiff() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::ones([4, 2, 3], &device);
        let out: Vec<f32> = DropPath::new(0.9).forward(x).into_data().to_vec().unwrap();
        assert!(out.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_drop_path_drops_whole_samples_when_training() {
        let device = Default::default();
        let x = Tensor::<TrainBackend, 3>::ones([64, 2, 3], &device);
        let values: Vec<f32> = DropPath::new(0.5).forward(x).into_data().to_vec().unwrap();

        // Each sample is either all zeros or all 1/keep = 2.0
        for sample in values.chunks(6) {
            let first = sample[0];
            assert!(first == 0.0 || (first - 2.0).abs() < 1e-6);
            assert!(sample.iter().all(|v| *v == first));
        }
    }

    #[test]
    fn test_block_preserves_shape() {
        let device = Default::default();
        let block = TransformerBlockConfig::new(16, 2)
            .with_mlp_ratio(2.0)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([2, 5, 16], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [2, 5, 16]);
    }

    #[test]
    fn test_hidden_dim() {
        assert_eq!(TransformerBlockConfig::new(384, 6).hidden_dim(), 1152);
        assert_eq!(TransformerBlockConfig::new(128, 2).with_mlp_ratio(1.0).hidden_dim(), 128);
    }

    #[test]
    fn test_parse_schedule() {
        assert_eq!("linear".parse::<StochasticDepthSchedule>().unwrap(), StochasticDepthSchedule::Linear);
        assert_eq!("Uniform".parse::<StochasticDepthSchedule>().unwrap(), StochasticDepthSchedule::Uniform);
        assert!("cosine".parse::<StochasticDepthSchedule>().is_err());
    }
}
