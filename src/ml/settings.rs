// ============================================================
// Layer 5 — Model Settings
// ============================================================
// A small mapping of ambient hyperparameters (epsilon, dropout,
// initializer names, head count, ...) that can be loaded from a
// JSON file and layered on top of a CctConfig.
//
// Every key is optional: only the keys present in the file
// override the config. Both snake_case and the camelCase keys of
// the reference settings dictionary are accepted:
//
//   {
//     "positionalEmbedding": true,
//     "std_embedding": 0.2,
//     "dropout": 0.1,
//     "transformerLayers": 2,
//     "epsilon": 1e-6,
//     "denseInitializer": "glorot_uniform",
//     "heads": 2,
//     "conv2DInitializer": "he_normal"
//   }

use anyhow::{Context, Result};
use burn::nn::Initializer;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, str::FromStr};

use crate::ml::embedding::PositionalEmbeddingKind;
use crate::ml::model::CctConfig;

/// Weight initializers, named the way Keras names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializerKind {
    GlorotUniform,
    GlorotNormal,
    HeNormal,
    HeUniform,
    Zeros,
}

impl InitializerKind {
    /// Burn initializer for this kind.
    ///
    /// He initializers use gain √2 (ReLU) over fan-in.
    pub fn to_initializer(self) -> Initializer {
        match self {
            Self::GlorotUniform => Initializer::XavierUniform { gain: 1.0 },
            Self::GlorotNormal  => Initializer::XavierNormal { gain: 1.0 },
            Self::HeNormal      => Initializer::KaimingNormal {
                gain:          std::f64::consts::SQRT_2,
                fan_out_only:  false,
            },
            Self::HeUniform     => Initializer::KaimingUniform {
                gain:          std::f64::consts::SQRT_2,
                fan_out_only:  false,
            },
            Self::Zeros         => Initializer::Zeros,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GlorotUniform => "glorot_uniform",
            Self::GlorotNormal  => "glorot_normal",
            Self::HeNormal      => "he_normal",
            Self::HeUniform     => "he_uniform",
            Self::Zeros         => "zeros",
        }
    }
}

impl fmt::Display for InitializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InitializerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "glorot_uniform" | "xavier_uniform" => Ok(Self::GlorotUniform),
            "glorot_normal"  | "xavier_normal"  => Ok(Self::GlorotNormal),
            "he_normal"      | "kaiming_normal" => Ok(Self::HeNormal),
            "he_uniform"     | "kaiming_uniform" => Ok(Self::HeUniform),
            "zeros"                             => Ok(Self::Zeros),
            other => anyhow::bail!("unknown initializer '{other}'"),
        }
    }
}

/// Optional overrides for the ambient model hyperparameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CctSettings {
    #[serde(alias = "positionalEmbedding")]
    pub positional_embedding: Option<bool>,
    pub std_embedding:        Option<f64>,
    /// Seed for weight initialisation and the train/validation split
    pub seed:                 Option<u64>,
    pub dropout:              Option<f64>,
    #[serde(alias = "transformerLayers")]
    pub transformer_layers:   Option<usize>,
    pub epsilon:              Option<f64>,
    #[serde(alias = "denseInitializer")]
    pub dense_initializer:    Option<InitializerKind>,
    pub heads:                Option<usize>,
    #[serde(alias = "conv2DInitializer")]
    pub conv2d_initializer:   Option<InitializerKind>,
}

impl CctSettings {
    /// The reference settings dictionary, with every key set.
    pub fn reference() -> Self {
        Self {
            positional_embedding: Some(true),
            std_embedding:        Some(0.2),
            seed:                 None,
            dropout:              Some(0.1),
            transformer_layers:   Some(2),
            epsilon:              Some(1e-6),
            dense_initializer:    Some(InitializerKind::GlorotUniform),
            heads:                Some(2),
            conv2d_initializer:   Some(InitializerKind::HeNormal),
        }
    }

    /// Read settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read settings from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid settings file '{}'", path.display()))
    }

    /// True when no key overrides anything.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Layer the present keys over `config`.
    ///
    /// Turning the positional embedding on keeps a sinusoidal choice
    /// and otherwise selects the learnable one.
    pub fn apply(&self, mut config: CctConfig) -> CctConfig {
        if let Some(enabled) = self.positional_embedding {
            config.positional_embedding = match (enabled, config.positional_embedding) {
                (false, _) => PositionalEmbeddingKind::Disabled,
                (true, PositionalEmbeddingKind::Sinusoidal) => PositionalEmbeddingKind::Sinusoidal,
                (true, _) => PositionalEmbeddingKind::Learnable,
            };
        }
        if let Some(std) = self.std_embedding {
            config.embedding_std = std;
        }
        if let Some(rate) = self.dropout {
            config.dropout = rate;
            config.attention_dropout = rate;
        }
        if let Some(layers) = self.transformer_layers {
            config.num_transformer_layers = layers;
        }
        if let Some(eps) = self.epsilon {
            config.layer_norm_epsilon = eps;
        }
        if let Some(init) = self.dense_initializer {
            config.dense_initializer = init;
        }
        if let Some(heads) = self.heads {
            config.num_heads = heads;
        }
        if let Some(init) = self.conv2d_initializer {
            config.conv_initializer = init;
        }
        config
    }
}
