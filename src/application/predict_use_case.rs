// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Classifies one image file or every image in a directory with
// the checkpoint written by `train`.
//
//   1. Rebuild the model from train_config.json
//   2. Load the best (or latest) weights and classes.json
//   3. Run each image through the ImageClassifier trait

use anyhow::{bail, Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::data::loader::is_image_file;
use crate::domain::{image::Prediction, traits::ImageClassifier};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::{InferBackend, Inferencer};

/// Predictions for one file.
#[derive(Debug, Clone)]
pub struct FilePredictions {
    pub path:        PathBuf,
    pub predictions: Vec<Prediction>,
}

pub struct PredictUseCase<C: ImageClassifier> {
    classifier: C,
}

impl PredictUseCase<Inferencer<InferBackend>> {
    /// Load the trained model from `checkpoint_dir` on the WGPU device.
    pub fn from_checkpoint(checkpoint_dir: impl AsRef<Path>) -> Result<Self> {
        let ckpt       = CheckpointManager::open(checkpoint_dir)?;
        let device     = burn::backend::wgpu::WgpuDevice::default();
        let inferencer = Inferencer::<InferBackend>::from_checkpoint(&ckpt, device)?;
        Ok(Self::new(inferencer))
    }
}

impl<C: ImageClassifier> PredictUseCase<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    /// A single image, or every image file directly inside a directory.
    pub fn predict(&self, path: impl AsRef<Path>, top_k: usize) -> Result<Vec<FilePredictions>> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            list_images(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            bail!("'{}' is neither an image file nor a directory", path.display());
        };

        if files.is_empty() {
            tracing::warn!("No image files found in '{}'", path.display());
        }

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            match self.classifier.classify(&file, top_k) {
                Ok(predictions) => results.push(FilePredictions { path: file, predictions }),
                // Single files propagate; directories skip what they cannot read
                Err(e) if path.is_file() => return Err(e),
                Err(e) => tracing::warn!("Skipping '{}': {e:#}", file.display()),
            }
        }
        Ok(results)
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classifies by file name so no model is needed.
    struct NameClassifier;

    impl ImageClassifier for NameClassifier {
        fn classify(&self, path: &Path, _top_k: usize) -> Result<Vec<Prediction>> {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if stem == "broken" {
                bail!("cannot decode");
            }
            Ok(vec![Prediction { label: 0, class_name: stem.to_string(), confidence: 1.0 }])
        }
    }

    #[test]
    fn test_directory_predicts_sorted_images_only() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }

        let results = PredictUseCase::new(NameClassifier).predict(tmp.path(), 1).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.predictions[0].class_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_directory_skips_failures() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("broken.png"), b"x").unwrap();
        fs::write(tmp.path().join("ok.png"), b"x").unwrap();

        let results = PredictUseCase::new(NameClassifier).predict(tmp.path(), 1).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_single_file_failure_propagates() {
        let tmp  = tempfile::tempdir().unwrap();
        let file = tmp.path().join("broken.png");
        fs::write(&file, b"x").unwrap();
        assert!(PredictUseCase::new(NameClassifier).predict(&file, 1).is_err());
    }

    #[test]
    fn test_missing_path_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(PredictUseCase::new(NameClassifier).predict(tmp.path().join("nope"), 1).is_err());
    }
}
