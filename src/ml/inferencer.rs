// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the trained CCT from the checkpoint directory and
// classifies image files.
//
//   train_config.json → CctConfig → empty model
//   best (or latest) model_epoch_N.mpk.gz → weights
//   classes.json → label names
//
// Inference runs on the plain backend, so dropout and drop-path
// are inactive.

use anyhow::{ensure, Result};
use burn::prelude::*;
use std::path::Path;

use crate::data::preprocessor::Preprocessor;
use crate::domain::{
    image::{ClassMap, Prediction},
    traits::ImageClassifier,
};
use crate::infra::{checkpoint::CheckpointManager, class_store::ClassStore};
use crate::ml::model::{CctConfig, CctModel};

pub type InferBackend = burn::backend::Wgpu;

pub struct Inferencer<B: Backend> {
    model:        CctModel<B>,
    model_cfg:    CctConfig,
    classes:      ClassMap,
    preprocessor: Preprocessor,
    device:       B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(
        model:     CctModel<B>,
        model_cfg: CctConfig,
        classes:   ClassMap,
        device:    B::Device,
    ) -> Result<Self> {
        ensure!(
            model_cfg.add_top && classes.len() == model_cfg.num_classes,
            "model has {} outputs but {} class names were given",
            model_cfg.output_dim(), classes.len(),
        );
        let preprocessor = Preprocessor::new(
            model_cfg.image_height,
            model_cfg.image_width,
            model_cfg.in_channels,
        )?;
        Ok(Self { model, model_cfg, classes, preprocessor, device })
    }

    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg       = ckpt_manager.load_config()?;
        let model_cfg = cfg.model_config();
        model_cfg.validate()?;

        let classes = ClassStore::new(ckpt_manager.dir()).load()?;

        let epoch = ckpt_manager.preferred_epoch()?;
        let model = ckpt_manager.load_model(model_cfg.init::<B>(&device), epoch, &device)?;
        tracing::info!(
            "Model loaded from epoch {} ({} classes, {}x{} input)",
            epoch, classes.len(), model_cfg.image_height, model_cfg.image_width,
        );

        Self::new(model, model_cfg, classes, device)
    }

    /// Class probabilities for one preprocessed CHW image.
    pub fn probabilities(&self, pixels: Vec<f32>) -> Result<Vec<f32>> {
        ensure!(
            pixels.len() == self.preprocessor.sample_len(),
            "expected {} pixel values, got {}",
            self.preprocessor.sample_len(), pixels.len(),
        );
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(
                pixels,
                [1, self.model_cfg.in_channels, self.model_cfg.image_height, self.model_cfg.image_width],
            ),
            &self.device,
        );
        self.model
            .predict_proba(images)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read probabilities: {e:?}"))
    }
}

/// The `k` most probable classes, best first.
pub fn top_k(probs: &[f32], k: usize, classes: &ClassMap) -> Vec<Prediction> {
    let mut ranked: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
        .into_iter()
        .take(k.max(1))
        .map(|(label, confidence)| Prediction {
            label,
            class_name: classes.name_of(label).unwrap_or("?").to_string(),
            confidence,
        })
        .collect()
}

impl<B: Backend> ImageClassifier for Inferencer<B> {
    fn classify(&self, path: &Path, top_k_count: usize) -> Result<Vec<Prediction>> {
        let pixels = self.preprocessor.load(path)?;
        let probs  = self.probabilities(pixels)?;
        let preds  = top_k(&probs, top_k_count, &self.classes);

        if let Some(best) = preds.first() {
            tracing::debug!(
                "'{}' → {} ({:.1}%)",
                path.display(), best.class_name, best.confidence * 100.0,
            );
        }
        Ok(preds)
    }
}
