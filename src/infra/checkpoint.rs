// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores CCT weights as gzipped MessagePack records
// at full precision, so a reloaded model reproduces its outputs.
//
// File layout:
//   checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1
//     model_epoch_2.mpk.gz
//     ...
//     latest_epoch.json      ← number of the last saved epoch
//     best_epoch.json        ← epoch with the lowest monitored loss
//     train_config.json      ← TrainConfig used for the run
//     classes.json           ← written by ClassStore
//     metrics.csv            ← written by MetricsLogger
//
// The config is stored next to the weights because the record
// only holds parameters; the inferencer rebuilds the module tree
// from train_config.json before loading the record into it.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::CctModel;

type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

const LATEST_FILE: &str = "latest_epoch.json";
const BEST_FILE:   &str = "best_epoch.json";
const CONFIG_FILE: &str = "train_config.json";

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory without creating it.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        anyhow::ensure!(
            dir.is_dir(),
            "Checkpoint dir '{}' does not exist. Have you run 'train' first?",
            dir.display()
        );
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn model_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("model_epoch_{epoch}"))
    }

    /// Write {dir}/model_epoch_{epoch}.mpk.gz and move the latest pointer.
    pub fn save_model<B: Backend>(&self, model: &CctModel<B>, epoch: usize) -> Result<()> {
        // recorder appends the extension
        let path = self.model_path(epoch);

        CheckpointRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| {
                format!("Failed to save checkpoint to '{}'", path.display())
            })?;

        self.write_epoch(LATEST_FILE, epoch)?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Forget the best pointer of an earlier run in this directory.
    pub fn clear_best(&self) -> Result<()> {
        let path = self.dir.join(BEST_FILE);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Cannot remove '{}'", path.display()))?;
        }
        Ok(())
    }

    /// Record `epoch` as the best one seen so far.
    pub fn mark_best(&self, epoch: usize) -> Result<()> {
        self.write_epoch(BEST_FILE, epoch)
    }

    /// Load the weights of `epoch` into a model of matching architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  CctModel<B>,
        epoch:  usize,
        device: &B::Device,
    ) -> Result<CctModel<B>> {
        let path = self.model_path(epoch);
        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CheckpointRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display())
            })?;

        Ok(model.load_record(record))
    }

    /// Best epoch when one was marked, otherwise the latest.
    pub fn preferred_epoch(&self) -> Result<usize> {
        match self.read_epoch(BEST_FILE) {
            Ok(epoch) => Ok(epoch),
            Err(_)    => self.latest_epoch(),
        }
    }

    pub fn latest_epoch(&self) -> Result<usize> {
        self.read_epoch(LATEST_FILE)
            .with_context(|| format!(
                "Cannot find '{LATEST_FILE}' in '{}'. Have you run 'train' first?",
                self.dir.display()
            ))
    }

    /// Must run before training so the inferencer can rebuild the model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| {
                format!("Cannot write config to '{}'", path.display())
            })?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);

        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'predict'.",
                    path.display()
                )
            })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }

    fn write_epoch(&self, file: &str, epoch: usize) -> Result<()> {
        fs::write(self.dir.join(file), serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write {file}"))
    }

    fn read_epoch(&self, file: &str) -> Result<usize> {
        let s = fs::read_to_string(self.dir.join(file))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::ml::model::CctConfig;

    type TestBackend = NdArray<f32>;

    fn tiny_config() -> CctConfig {
        CctConfig::new(3, 8, 8)
            .with_num_transformer_layers(1)
            .with_num_heads(2)
            .with_mlp_ratio(1.0)
            .with_embedding_dim(8)
            .with_tokenizer_kernel_size(3)
            .with_tokenizer_conv_layers(1)
    }

    #[test]
    fn test_latest_epoch_missing_is_error() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        assert!(ckpt.latest_epoch().is_err());
        assert!(ckpt.preferred_epoch().is_err());
    }

    #[test]
    fn test_open_missing_dir_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(CheckpointManager::open(tmp.path().join("nope")).is_err());
    }

    #[test]
    fn test_preferred_epoch_uses_best_then_latest() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        ckpt.write_epoch(LATEST_FILE, 5).unwrap();
        assert_eq!(ckpt.preferred_epoch().unwrap(), 5);
        ckpt.mark_best(3).unwrap();
        assert_eq!(ckpt.preferred_epoch().unwrap(), 3);
    }

    #[test]
    fn test_clear_best_falls_back_to_latest() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        ckpt.write_epoch(LATEST_FILE, 4).unwrap();
        ckpt.mark_best(2).unwrap();
        ckpt.clear_best().unwrap();
        assert_eq!(ckpt.preferred_epoch().unwrap(), 4);
        // Nothing to remove the second time
        assert!(ckpt.clear_best().is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        let cfg  = TrainConfig { epochs: 3, num_classes: 7, ..Default::default() };
        ckpt.save_config(&cfg).unwrap();
        let back = ckpt.load_config().unwrap();
        assert_eq!(back.epochs, 3);
        assert_eq!(back.num_classes, 7);
    }

    #[test]
    fn test_model_round_trip_restores_weights() {
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path()).unwrap();
        let device = Default::default();

        let model = tiny_config().init::<TestBackend>(&device);
        ckpt.save_model(&model, 1).unwrap();
        assert_eq!(ckpt.latest_epoch().unwrap(), 1);
        assert!(tmp.path().join("model_epoch_1.mpk.gz").exists());

        let fresh  = tiny_config().init::<TestBackend>(&device);
        let loaded = ckpt.load_model(fresh, 1, &device).unwrap();

        let images = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        let a: Vec<f32> = model.forward(images.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.forward(images).into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
