// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits, not to the
// concrete loader or model:
//   - ImageFolderLoader implements ImageSource
//   - Inferencer implements ImageClassifier
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use std::path::Path;

use crate::domain::image::{ClassMap, ImageRecord, Prediction};

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Any component that can enumerate labelled images.
pub trait ImageSource {
    /// The classes this source knows about.
    fn classes(&self) -> Result<ClassMap>;

    /// Every labelled image, labels indexed into `classes()`.
    fn load_all(&self) -> Result<Vec<ImageRecord>>;
}

// ─── ImageClassifier ──────────────────────────────────────────────────────────
/// Any component that can classify an image file.
pub trait ImageClassifier {
    /// The `top_k` most likely classes, best first.
    fn classify(&self, path: &Path, top_k: usize) -> Result<Vec<Prediction>>;
}
