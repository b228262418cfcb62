// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: List labelled images        (Layer 4 - data)
//   Step 2: Decode + normalise          (Layer 4 - data)
//   Step 3: Split train/validation      (Layer 4 - data)
//   Step 4: Build Burn datasets         (Layer 4 - data)
//   Step 5: Resolve + check model config (Layer 5 - ml)
//   Step 6: Save config and classes     (Layer 6 - infra)
//   Step 7: Run training loop           (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::ImageDataset,
    loader::ImageFolderLoader,
    preprocessor::Preprocessor,
    splitter::split_train_val,
};
use crate::domain::{traits::ImageSource, variant::CctVariant};
use crate::infra::{
    checkpoint::CheckpointManager,
    class_store::ClassStore,
    metrics::MetricsLogger,
};
use crate::ml::{
    block::StochasticDepthSchedule,
    embedding::PositionalEmbeddingKind,
    model::CctConfig,
    settings::{CctSettings, InitializerKind},
    trainer::{run_training, TrainReport},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything needed to reproduce a run. Saved next to the
// checkpoints so inference can rebuild the exact architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:       String,
    pub checkpoint_dir: String,

    pub image_height: usize,
    pub image_width:  usize,
    pub in_channels:  usize,
    /// Filled in from the image folder before training
    pub num_classes:  usize,

    pub batch_size:      usize,
    pub epochs:          usize,
    pub lr:              f64,
    pub weight_decay:    f64,
    pub label_smoothing: f64,
    pub train_fraction:  f64,
    pub num_workers:     usize,
    pub seed:            Option<u64>,

    pub num_layers:                usize,
    pub num_heads:                 usize,
    pub mlp_ratio:                 f64,
    pub embedding_dim:             usize,
    pub kernel_size:               usize,
    pub tokenizer_stride:          usize,
    pub conv_layers:               usize,
    pub dropout:                   f64,
    pub attention_dropout:         f64,
    pub stochastic_depth_rate:     f64,
    pub stochastic_depth_schedule: StochasticDepthSchedule,
    pub seq_pool_weights:          usize,
    pub positional_embedding:      PositionalEmbeddingKind,
    pub embedding_std:             f64,
    pub final_dropout:             f64,
    pub layer_norm_epsilon:        f64,
    pub dense_initializer:         InitializerKind,
    pub conv_initializer:          InitializerKind,

    /// Overrides layered on top of the fields above
    #[serde(default)]
    pub settings: CctSettings,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let model = CctConfig::new(0, 224, 224);
        Self {
            data_dir:       "data/images".to_string(),
            checkpoint_dir: "checkpoints".to_string(),

            image_height: model.image_height,
            image_width:  model.image_width,
            in_channels:  model.in_channels,
            num_classes:  0,

            batch_size:      32,
            epochs:          10,
            lr:              5e-4,
            weight_decay:    3e-2,
            label_smoothing: 0.1,
            train_fraction:  0.8,
            num_workers:     2,
            seed:            None,

            num_layers:                model.num_transformer_layers,
            num_heads:                 model.num_heads,
            mlp_ratio:                 model.mlp_ratio,
            embedding_dim:             model.embedding_dim,
            kernel_size:               model.tokenizer_kernel_size,
            tokenizer_stride:          model.tokenizer_stride,
            conv_layers:               model.tokenizer_conv_layers,
            dropout:                   model.dropout,
            attention_dropout:         model.attention_dropout,
            stochastic_depth_rate:     model.stochastic_depth_rate,
            stochastic_depth_schedule: model.stochastic_depth_schedule,
            seq_pool_weights:          model.seq_pool_weights,
            positional_embedding:      model.positional_embedding,
            embedding_std:             model.embedding_std,
            final_dropout:             model.final_dropout,
            layer_norm_epsilon:        model.layer_norm_epsilon,
            dense_initializer:         model.dense_initializer,
            conv_initializer:          model.conv_initializer,

            settings: CctSettings::default(),
        }
    }
}

impl TrainConfig {
    /// Take depth, width and tokenizer shape from a CCT-L/KxT name.
    pub fn apply_variant(&mut self, variant: CctVariant) {
        self.num_layers    = variant.layers;
        self.kernel_size   = variant.kernel_size;
        self.conv_layers   = variant.conv_layers;
        self.embedding_dim = variant.embedding_dim();
        self.num_heads     = variant.num_heads();
        self.mlp_ratio     = variant.mlp_ratio();
    }

    /// Seed from the settings file wins over the command line.
    pub fn effective_seed(&self) -> Option<u64> {
        self.settings.seed.or(self.seed)
    }

    /// The model this run trains, with the settings overrides applied.
    pub fn model_config(&self) -> CctConfig {
        let config = CctConfig::new(self.num_classes, self.image_height, self.image_width)
            .with_in_channels(self.in_channels)
            .with_num_transformer_layers(self.num_layers)
            .with_num_heads(self.num_heads)
            .with_mlp_ratio(self.mlp_ratio)
            .with_embedding_dim(self.embedding_dim)
            .with_tokenizer_kernel_size(self.kernel_size)
            .with_tokenizer_stride(self.tokenizer_stride)
            .with_tokenizer_conv_layers(self.conv_layers)
            .with_dropout(self.dropout)
            .with_attention_dropout(self.attention_dropout)
            .with_stochastic_depth_rate(self.stochastic_depth_rate)
            .with_stochastic_depth_schedule(self.stochastic_depth_schedule)
            .with_seq_pool_weights(self.seq_pool_weights)
            .with_positional_embedding(self.positional_embedding)
            .with_embedding_std(self.embedding_std)
            .with_add_top(true)
            .with_final_dropout(self.final_dropout)
            .with_layer_norm_epsilon(self.layer_norm_epsilon)
            .with_dense_initializer(self.dense_initializer)
            .with_conv_initializer(self.conv_initializer);
        self.settings.apply(config)
    }

    /// Checks that do not need the image folder.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.epochs > 0, "epochs must be positive");
        ensure!(self.lr > 0.0, "learning rate must be positive");
        ensure!(self.weight_decay >= 0.0, "weight_decay must not be negative");
        ensure!(
            (0.0..1.0).contains(&self.label_smoothing),
            "label_smoothing must be in [0, 1), got {}", self.label_smoothing,
        );
        ensure!(
            self.train_fraction > 0.0 && self.train_fraction <= 1.0,
            "train_fraction must be in (0, 1], got {}", self.train_fraction,
        );
        ensure!(
            self.in_channels == 1 || self.in_channels == 3,
            "in_channels must be 1 or 3, got {}", self.in_channels,
        );
        // num_classes is unknown until the folder is read
        let mut model = self.model_config();
        model.num_classes = self.num_classes.max(1);
        model.validate()
    }

    pub fn label_smoothing(&self) -> Option<f32> {
        (self.label_smoothing > 0.0).then_some(self.label_smoothing as f32)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainReport> {
        let mut cfg = self.config.clone();
        cfg.validate()?;

        // ── Step 1: List labelled images ──────────────────────────────────────
        let loader  = ImageFolderLoader::new(&cfg.data_dir);
        let classes = loader.classes()?;
        ensure!(
            classes.len() >= 2,
            "'{}' needs at least two class folders, found {}",
            cfg.data_dir, classes.len(),
        );
        let records = loader.load_all()?;
        cfg.num_classes = classes.len();

        // ── Step 2: Decode + normalise ────────────────────────────────────────
        let preprocessor = Preprocessor::new(cfg.image_height, cfg.image_width, cfg.in_channels)?;
        let samples = preprocessor.process_all(&records);
        ensure!(!samples.is_empty(), "no readable images under '{}'", cfg.data_dir);

        // ── Step 3: Train / validation split ──────────────────────────────────
        let (train_samples, val_samples) =
            split_train_val(samples, cfg.train_fraction, cfg.effective_seed());
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 4: Build Burn datasets ───────────────────────────────────────
        let train_dataset = ImageDataset::new(train_samples);
        let val_dataset   = ImageDataset::new(val_samples);
        tracing::debug!("Training class counts: {:?}", train_dataset.class_counts(cfg.num_classes));

        // ── Step 5: Resolve model config ──────────────────────────────────────
        let model_cfg = cfg.model_config();
        model_cfg.validate()?;
        tracing::info!(
            "Model: {} layers, {} heads, dim {}, {} tokens",
            model_cfg.num_transformer_layers,
            model_cfg.num_heads,
            model_cfg.embedding_dim,
            model_cfg.num_patches(),
        );

        // ── Step 6: Save config and classes for inference ─────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(&cfg)?;
        ClassStore::new(&cfg.checkpoint_dir).save(&classes)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 7: Run training loop (Layer 5) ───────────────────────────────
        run_training(&cfg, &model_cfg, train_dataset, val_dataset, &ckpt_manager, &metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_model_is_cct_14_7x2() {
        let model = TrainConfig::default().model_config();
        assert_eq!(model.num_transformer_layers, 14);
        assert_eq!(model.embedding_dim, 384);
        assert_eq!(model.tokenizer_kernel_size, 7);
        assert!(model.add_top);
    }

    #[test]
    fn test_variant_sets_architecture() {
        let mut cfg = TrainConfig::default();
        cfg.apply_variant("CCT-7/3x1".parse().unwrap());
        let model = cfg.model_config();
        assert_eq!(model.num_transformer_layers, 7);
        assert_eq!(model.num_heads, 4);
        assert_eq!(model.embedding_dim, 256);
        assert_eq!(model.mlp_ratio, 2.0);
        assert_eq!(model.tokenizer_kernel_size, 3);
        assert_eq!(model.tokenizer_conv_layers, 1);
    }

    #[test]
    fn test_settings_override_fields() {
        let mut cfg = TrainConfig::default();
        cfg.seed = Some(1);
        cfg.settings = CctSettings {
            heads:   Some(4),
            epsilon: Some(1e-5),
            seed:    Some(7),
            ..Default::default()
        };
        let model = cfg.model_config();
        assert_eq!(model.num_heads, 4);
        assert_eq!(model.layer_norm_epsilon, 1e-5);
        assert_eq!(cfg.effective_seed(), Some(7));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = TrainConfig { batch_size: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = TrainConfig { in_channels: 2, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = TrainConfig { label_smoothing: 1.0, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = TrainConfig { num_heads: 5, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_label_smoothing_off_when_zero() {
        let cfg = TrainConfig { label_smoothing: 0.0, ..Default::default() };
        assert_eq!(cfg.label_smoothing(), None);
        assert_eq!(TrainConfig::default().label_smoothing(), Some(0.1));
    }

    #[test]
    fn test_config_json_round_trip_keeps_model() {
        let mut cfg = TrainConfig::default();
        cfg.num_classes = 5;
        cfg.positional_embedding = PositionalEmbeddingKind::Sinusoidal;
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.model_config().num_patches(), cfg.model_config().num_patches());
        assert_eq!(back.positional_embedding, PositionalEmbeddingKind::Sinusoidal);
        assert_eq!(back.num_classes, 5);
    }

    #[test]
    fn test_execute_fails_on_missing_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            data_dir:       tmp.path().join("missing").to_string_lossy().into_owned(),
            checkpoint_dir: tmp.path().join("ckpt").to_string_lossy().into_owned(),
            ..Default::default()
        };
        assert!(TrainUseCase::new(cfg).execute().is_err());
    }
}
