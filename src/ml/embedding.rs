// ============================================================
// Layer 5 — Positional Embedding
// ============================================================
// The tokenizer output is a bag of patch tokens; self-attention
// is permutation-invariant, so position must be injected.
//
// Two flavours:
//   learnable    a [1, N, D] parameter, normal(0, std) clipped
//                at ±2 std
//   sinusoidal   the fixed sin/cos table from Vaswani et al.
//
// The embedding is broadcast over the batch and added to the
// tokens: [B, N, D] + [1, N, D] → [B, N, D]

use anyhow::Result;
use burn::{
    module::Param,
    prelude::*,
    tensor::Distribution,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Which positional embedding to add after the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionalEmbeddingKind {
    Learnable,
    Sinusoidal,
    Disabled,
}

impl fmt::Display for PositionalEmbeddingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Learnable  => "learnable",
            Self::Sinusoidal => "sinusoidal",
            Self::Disabled   => "disabled",
        })
    }
}

impl FromStr for PositionalEmbeddingKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "learnable" | "learned" => Ok(Self::Learnable),
            "sinusoidal" | "sinusodial" | "sine" => Ok(Self::Sinusoidal),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => anyhow::bail!("unknown positional embedding '{other}'"),
        }
    }
}

/// Row-major `[num_tokens, dim]` sinusoidal table.
///
/// Even columns hold `sin(p / 10000^(2i/d))`, odd columns the
/// matching cosine.
pub fn sinusoidal_table(num_tokens: usize, dim: usize) -> Vec<f32> {
    let mut table = vec![0.0f32; num_tokens * dim];
    for pos in 0..num_tokens {
        for col in 0..dim {
            let pair  = (col / 2) as f64;
            let angle = pos as f64 / 10_000f64.powf(2.0 * pair / dim as f64);
            let value = if col % 2 == 0 { angle.sin() } else { angle.cos() };
            table[pos * dim + col] = value as f32;
        }
    }
    table
}

#[derive(Module, Debug)]
pub struct PositionalEmbedding<B: Backend> {
    /// Present for the learnable flavour
    pub learned:       Option<Param<Tensor<B, 3>>>,
    /// Present for the sinusoidal flavour; a constant, not trained
    pub fixed:         Option<Tensor<B, 3>>,
    pub num_tokens:    usize,
    pub embedding_dim: usize,
}

impl<B: Backend> PositionalEmbedding<B> {
    /// Learnable embedding drawn from normal(0, std), clipped at ±2 std.
    pub fn learnable(num_tokens: usize, embedding_dim: usize, std: f64, device: &B::Device) -> Self {
        let weights = Tensor::<B, 3>::random(
            [1, num_tokens, embedding_dim],
            Distribution::Normal(0.0, std),
            device,
        )
        .clamp(-2.0 * std, 2.0 * std);

        Self {
            learned: Some(Param::from_tensor(weights)),
            fixed:   None,
            num_tokens,
            embedding_dim,
        }
    }

    /// Fixed sinusoidal embedding. The table is built once, here,
    /// and holds no parameters.
    pub fn sinusoidal(num_tokens: usize, embedding_dim: usize, device: &B::Device) -> Self {
        let table = Tensor::from_data(
            TensorData::new(
                sinusoidal_table(num_tokens, embedding_dim),
                [1, num_tokens, embedding_dim],
            ),
            device,
        );
        Self { learned: None, fixed: Some(table), num_tokens, embedding_dim }
    }

    /// The `[1, N, D]` embedding tensor.
    pub fn embedding(&self) -> Tensor<B, 3> {
        match (&self.learned, &self.fixed) {
            (Some(param), _)    => param.val(),
            (None, Some(table)) => table.clone(),
            (None, None)        => Tensor::zeros([1, self.num_tokens, self.embedding_dim], &B::Device::default()),
        }
    }

    /// tokens: [batch, N, D] → [batch, N, D]
    pub fn forward(&self, tokens: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, num_tokens, dim] = tokens.dims();
        let embedding = self.embedding().to_device(&tokens.device());
        tokens + embedding.expand([batch, num_tokens, dim])
    }
}
