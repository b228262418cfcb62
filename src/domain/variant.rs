// ============================================================
// Layer 3 — CCT Variant Names
// ============================================================
// CCT models are named CCT-L/KxT:
//   L: number of transformer encoder layers
//   K: tokenizer kernel size (K×K)
//   T: number of tokenizer conv layers
//
// e.g. CCT-14/7x2 (ImageNet), CCT-7/3x1 (CIFAR).
//
// The encoder width follows the depth, as in the paper:
//
//   L ≤ 4   →  dim 128, 2 heads, mlp ratio 1
//   L ≤ 8   →  dim 256, 4 heads, mlp ratio 2
//   else    →  dim 384, 6 heads, mlp ratio 3
//
// Reference: Hassani et al. (2021) Escaping the Big Data
//            Paradigm with Compact Transformers

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CctVariant {
    pub layers:      usize,
    pub kernel_size: usize,
    pub conv_layers: usize,
}

impl CctVariant {
    pub fn new(layers: usize, kernel_size: usize, conv_layers: usize) -> Self {
        Self { layers, kernel_size, conv_layers }
    }

    pub fn embedding_dim(&self) -> usize {
        match self.layers {
            0..=4 => 128,
            5..=8 => 256,
            _     => 384,
        }
    }

    pub fn num_heads(&self) -> usize {
        match self.layers {
            0..=4 => 2,
            5..=8 => 4,
            _     => 6,
        }
    }

    pub fn mlp_ratio(&self) -> f64 {
        match self.layers {
            0..=4 => 1.0,
            5..=8 => 2.0,
            _     => 3.0,
        }
    }
}

impl fmt::Display for CctVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CCT-{}/{}x{}", self.layers, self.kernel_size, self.conv_layers)
    }
}

/// Accepts `CCT-14/7x2`, `cct_14_7x2` and `14/7x2`.
impl FromStr for CctVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let body  = lower
            .strip_prefix("cct")
            .map(|rest| rest.trim_start_matches(['-', '_']))
            .unwrap_or(&lower);

        let (layers, tokenizer) = body
            .split_once(['/', '_'])
            .with_context(|| format!("'{s}' is not of the form CCT-L/KxT"))?;
        let (kernel, convs) = tokenizer
            .split_once('x')
            .with_context(|| format!("'{s}' is missing the KxT tokenizer part"))?;

        let parse = |part: &str, what: &str| -> Result<usize> {
            part.parse::<usize>()
                .with_context(|| format!("invalid {what} '{part}' in '{s}'"))
        };
        let variant = Self::new(
            parse(layers, "layer count")?,
            parse(kernel, "kernel size")?,
            parse(convs, "conv layer count")?,
        );

        if variant.layers == 0 || variant.kernel_size == 0 || variant.conv_layers == 0 {
            bail!("'{s}': every part of CCT-L/KxT must be positive");
        }
        Ok(variant)
    }
}
