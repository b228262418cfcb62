// ============================================================
// Layer 2 — Summary Use Case
// ============================================================
// Builds a CCT on the CPU backend and reports how an image
// flows through it: tensor shape after every stage and the
// parameter count of every component.
//
// The shapes are derived from the config, then checked against
// one real forward pass on a blank image.

use anyhow::{ensure, Result};
use burn::{backend::NdArray, prelude::*};
use std::fmt;

use crate::ml::{
    model::{CctConfig, CctModel},
    shape::{ceil_div, tokenizer_channels},
};

type SummaryBackend = NdArray<f32>;

/// One row of the shape table.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name:  String,
    pub shape: Vec<usize>,
}

impl Stage {
    fn new(name: impl Into<String>, shape: &[usize]) -> Self {
        Self { name: name.into(), shape: shape.to_vec() }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub token_grid: (usize, usize),
    pub stages:     Vec<Stage>,
    /// (component, parameters)
    pub params:     Vec<(String, usize)>,
}

impl ModelSummary {
    pub fn total_params(&self) -> usize {
        self.params.iter().map(|(_, n)| n).sum()
    }

    pub fn output_shape(&self) -> &[usize] {
        self.stages.last().map(|s| s.shape.as_slice()).unwrap_or(&[])
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.token_grid;
        writeln!(f, "Token grid: {rows}x{cols} ({} tokens)", rows * cols)?;
        writeln!(f)?;
        writeln!(f, "{:<28} shape", "stage")?;
        for stage in &self.stages {
            writeln!(f, "{:<28} {:?}", stage.name, stage.shape)?;
        }
        writeln!(f)?;
        writeln!(f, "{:<28} params", "component")?;
        for (name, count) in &self.params {
            writeln!(f, "{:<28} {count}", name)?;
        }
        write!(f, "{:<28} {}", "total", self.total_params())
    }
}

/// Shapes for a batch of one, computed from the config alone.
pub fn stage_shapes(cfg: &CctConfig) -> Vec<Stage> {
    let (mut h, mut w) = (cfg.image_height, cfg.image_width);
    let mut stages = vec![Stage::new("input", &[1, cfg.in_channels, h, w])];

    let channels = tokenizer_channels(cfg.embedding_dim, cfg.tokenizer_conv_layers);
    for (i, &c) in channels.iter().enumerate() {
        h = ceil_div(h, cfg.tokenizer_stride);
        w = ceil_div(w, cfg.tokenizer_stride);
        stages.push(Stage::new(format!("tokenizer.conv{i}"), &[1, c, h, w]));
        h = ceil_div(h, cfg.tokenizer_pool_stride);
        w = ceil_div(w, cfg.tokenizer_pool_stride);
        stages.push(Stage::new(format!("tokenizer.pool{i}"), &[1, c, h, w]));
    }

    let tokens = [1, h * w, cfg.embedding_dim];
    stages.push(Stage::new("tokens", &tokens));
    stages.push(Stage::new(format!("encoder x{}", cfg.num_transformer_layers), &tokens));
    stages.push(Stage::new("seq_pool", &[1, cfg.seq_pool_weights * cfg.embedding_dim]));
    if cfg.add_top {
        stages.push(Stage::new("head", &[1, cfg.num_classes]));
    }
    stages
}

fn param_counts<B: Backend>(model: &CctModel<B>) -> Vec<(String, usize)> {
    let mut params = vec![("tokenizer".to_string(), model.tokenizer.num_params())];
    if let Some(embedding) = &model.positional_embedding {
        params.push(("positional_embedding".to_string(), embedding.num_params()));
    }
    for (i, block) in model.blocks.iter().enumerate() {
        params.push((format!("block{i}"), block.num_params()));
    }
    params.push(("seq_pool".to_string(), model.seq_pool.num_params()));
    if let Some(head) = &model.head {
        params.push(("head".to_string(), head.num_params()));
    }
    params
}

pub struct SummaryUseCase {
    config: CctConfig,
}

impl SummaryUseCase {
    pub fn new(config: CctConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<ModelSummary> {
        self.config.validate()?;

        let device = Default::default();
        let model: CctModel<SummaryBackend> = self.config.init(&device);
        let stages = stage_shapes(&self.config);

        let image = Tensor::<SummaryBackend, 4>::zeros(
            [1, self.config.in_channels, self.config.image_height, self.config.image_width],
            &device,
        );
        let encoded = model.encode(image.clone()).dims();
        let output  = model.forward(image).dims();
        tracing::debug!("Forward check: encoded {:?}, output {:?}", encoded, output);

        ensure!(
            encoded[1] == self.config.num_patches(),
            "encoder produced {} tokens, expected {}",
            encoded[1], self.config.num_patches(),
        );
        ensure!(
            output[1] == self.config.output_dim(),
            "model produced {} outputs, expected {}",
            output[1], self.config.output_dim(),
        );

        Ok(ModelSummary {
            token_grid: self.config.token_grid(),
            stages,
            params: param_counts(&model),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> CctConfig {
        CctConfig::new(5, 16, 12)
            .with_num_transformer_layers(2)
            .with_num_heads(2)
            .with_mlp_ratio(1.0)
            .with_embedding_dim(16)
            .with_tokenizer_kernel_size(3)
    }

    #[test]
    fn test_stage_shapes_follow_tokenizer() {
        let stages = stage_shapes(&tiny_config());
        // 16x12 → conv 8x6 → pool 4x3 → conv 2x2 → pool 1x1
        assert_eq!(stages[1], Stage::new("tokenizer.conv0", &[1, 8, 8, 6]));
        assert_eq!(stages[2], Stage::new("tokenizer.pool0", &[1, 8, 4, 3]));
        assert_eq!(stages[4], Stage::new("tokenizer.pool1", &[1, 16, 1, 1]));
        assert_eq!(stages.last().unwrap().shape, vec![1, 5]);
    }

    #[test]
    fn test_summary_matches_forward_pass() {
        let summary = SummaryUseCase::new(tiny_config()).execute().unwrap();
        assert_eq!(summary.token_grid, (1, 1));
        assert_eq!(summary.output_shape(), &[1, 5]);
        assert!(summary.params.iter().any(|(name, _)| name == "block1"));
        assert!(summary.total_params() > 0);
    }

    #[test]
    fn test_headless_summary_ends_at_seq_pool() {
        let config  = tiny_config().with_add_top(false).with_seq_pool_weights(2);
        let summary = SummaryUseCase::new(config).execute().unwrap();
        assert_eq!(summary.output_shape(), &[1, 32]);
        assert!(summary.params.iter().all(|(name, _)| name != "head"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(SummaryUseCase::new(tiny_config().with_num_heads(3)).execute().is_err());
    }

    #[test]
    fn test_display_lists_total() {
        let text = SummaryUseCase::new(tiny_config()).execute().unwrap().to_string();
        assert!(text.contains("Token grid: 1x1"));
        assert!(text.contains("total"));
    }
}
