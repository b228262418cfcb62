// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Three subcommands: `train`, `predict` and `summary`.
//
// Architecture flags are shared by `train` and `summary` through
// ModelArgs and are resolved in this order:
//
//   TrainConfig defaults (CCT-14/7x2, 224×224)
//     → --variant CCT-L/KxT
//     → explicit flags (--num-layers, --kernel-size, ...)
//     → --settings JSON overrides
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::domain::variant::CctVariant;
use crate::ml::{
    block::StochasticDepthSchedule,
    embedding::PositionalEmbeddingKind,
    settings::{CctSettings, InitializerKind},
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a CCT on a class-per-folder image directory
    Train(TrainArgs),

    /// Classify an image (or a directory of images) with a trained checkpoint
    Predict(PredictArgs),

    /// Print token grid, stage shapes and parameter counts for a configuration
    Summary(SummaryArgs),
}

/// Architecture and input flags. Unset flags keep the variant's value.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Named preset, e.g. CCT-7/3x1 or cct_14_7x2
    #[arg(long)]
    pub variant: Option<CctVariant>,

    /// Square input size; overridden by --image-height / --image-width
    #[arg(long)]
    pub image_size: Option<usize>,

    #[arg(long)]
    pub image_height: Option<usize>,

    #[arg(long)]
    pub image_width: Option<usize>,

    /// 1 for grayscale, 3 for RGB
    #[arg(long)]
    pub in_channels: Option<usize>,

    /// Number of transformer encoder blocks
    #[arg(long)]
    pub num_layers: Option<usize>,

    /// embedding_dim must be divisible by num_heads
    #[arg(long)]
    pub num_heads: Option<usize>,

    /// MLP hidden width as a multiple of embedding_dim
    #[arg(long)]
    pub mlp_ratio: Option<f64>,

    #[arg(long)]
    pub embedding_dim: Option<usize>,

    /// Tokenizer kernel size (odd)
    #[arg(long)]
    pub kernel_size: Option<usize>,

    #[arg(long)]
    pub tokenizer_stride: Option<usize>,

    /// Number of tokenizer conv + pool layers
    #[arg(long)]
    pub conv_layers: Option<usize>,

    #[arg(long)]
    pub dropout: Option<f64>,

    #[arg(long)]
    pub attention_dropout: Option<f64>,

    #[arg(long)]
    pub stochastic_depth_rate: Option<f64>,

    /// uniform or linear
    #[arg(long)]
    pub stochastic_depth_schedule: Option<StochasticDepthSchedule>,

    /// Attention heads of the sequence pooling layer
    #[arg(long)]
    pub seq_pool_weights: Option<usize>,

    /// learnable, sinusoidal or none
    #[arg(long)]
    pub positional_embedding: Option<PositionalEmbeddingKind>,

    #[arg(long)]
    pub embedding_std: Option<f64>,

    /// Dropout before the classifier
    #[arg(long)]
    pub final_dropout: Option<f64>,

    #[arg(long)]
    pub layer_norm_epsilon: Option<f64>,

    /// glorot_uniform, glorot_normal, he_normal, he_uniform or zeros
    #[arg(long)]
    pub dense_initializer: Option<InitializerKind>,

    #[arg(long)]
    pub conv_initializer: Option<InitializerKind>,

    /// JSON file with settings overrides (positional_embedding, heads, ...)
    #[arg(long)]
    pub settings: Option<String>,
}

impl ModelArgs {
    /// Layer these flags over `cfg`.
    pub fn apply(&self, cfg: &mut TrainConfig) -> Result<()> {
        if let Some(variant) = self.variant {
            cfg.apply_variant(variant);
        }
        if let Some(size) = self.image_size {
            cfg.image_height = size;
            cfg.image_width  = size;
        }

        if let Some(v) = self.image_height              { cfg.image_height              = v; }
        if let Some(v) = self.image_width               { cfg.image_width               = v; }
        if let Some(v) = self.in_channels               { cfg.in_channels               = v; }
        if let Some(v) = self.num_layers                { cfg.num_layers                = v; }
        if let Some(v) = self.num_heads                 { cfg.num_heads                 = v; }
        if let Some(v) = self.mlp_ratio                 { cfg.mlp_ratio                 = v; }
        if let Some(v) = self.embedding_dim             { cfg.embedding_dim             = v; }
        if let Some(v) = self.kernel_size               { cfg.kernel_size               = v; }
        if let Some(v) = self.tokenizer_stride          { cfg.tokenizer_stride          = v; }
        if let Some(v) = self.conv_layers               { cfg.conv_layers               = v; }
        if let Some(v) = self.dropout                   { cfg.dropout                   = v; }
        if let Some(v) = self.attention_dropout         { cfg.attention_dropout         = v; }
        if let Some(v) = self.stochastic_depth_rate     { cfg.stochastic_depth_rate     = v; }
        if let Some(v) = self.stochastic_depth_schedule { cfg.stochastic_depth_schedule = v; }
        if let Some(v) = self.seq_pool_weights          { cfg.seq_pool_weights          = v; }
        if let Some(v) = self.positional_embedding      { cfg.positional_embedding      = v; }
        if let Some(v) = self.embedding_std             { cfg.embedding_std             = v; }
        if let Some(v) = self.final_dropout             { cfg.final_dropout             = v; }
        if let Some(v) = self.layer_norm_epsilon        { cfg.layer_norm_epsilon        = v; }
        if let Some(v) = self.dense_initializer         { cfg.dense_initializer         = v; }
        if let Some(v) = self.conv_initializer          { cfg.conv_initializer          = v; }

        if let Some(path) = &self.settings {
            cfg.settings = CctSettings::load(path)?;
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Root folder with one sub-folder of images per class
    #[arg(long, default_value = "data/images")]
    pub data_dir: String,

    /// Directory to save checkpoints, classes and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 5e-4)]
    pub lr: f64,

    /// L2 penalty added by the optimizer; 0 disables it
    #[arg(long, default_value_t = 3e-2)]
    pub weight_decay: f64,

    /// 0 disables label smoothing
    #[arg(long, default_value_t = 0.1)]
    pub label_smoothing: f64,

    /// Share of images used for training; the rest validates
    #[arg(long, default_value_t = 0.8)]
    pub train_fraction: f64,

    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    /// Seed for initialisation, shuffling and the split
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        let mut cfg = TrainConfig {
            data_dir:        a.data_dir,
            checkpoint_dir:  a.checkpoint_dir,
            batch_size:      a.batch_size,
            epochs:          a.epochs,
            lr:              a.lr,
            weight_decay:    a.weight_decay,
            label_smoothing: a.label_smoothing,
            train_fraction:  a.train_fraction,
            num_workers:     a.num_workers,
            seed:            a.seed,
            ..Default::default()
        };
        a.model.apply(&mut cfg)?;
        Ok(cfg)
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file, or a directory of images
    pub path: String,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Number of classes to report per image
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[arg(long, default_value_t = 1000)]
    pub num_classes: usize,

    /// Report pooled features instead of class logits
    #[arg(long)]
    pub no_top: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}
