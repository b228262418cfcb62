// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Enumerates a labelled image folder:
//
//   data/images/
//     cat/    a.png  b.jpg ...
//     dog/    c.png  ...
//
// Every sub-directory is a class; its name becomes the class
// name and its alphabetical position the label. Only files with
// a known image extension are listed. Decoding is left to the
// Preprocessor, so a corrupt file is reported there.
//
// Reference: Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::image::{ClassMap, ImageRecord};
use crate::domain::traits::ImageSource;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];

/// True if the path has an image file extension (case-insensitive).
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Loads labelled images from `root/<class>/<file>`.
pub struct ImageFolderLoader {
    root: PathBuf,
}

impl ImageFolderLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Sub-directories of the root, sorted by name.
    fn class_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        if !self.root.is_dir() {
            bail!("Image directory '{}' does not exist", self.root.display());
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Cannot read directory '{}'", self.root.display()))?
        {
            let path = entry?.path();
            if !path.is_dir() {
                tracing::debug!("Ignoring '{}': not a class directory", path.display());
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                dirs.push((name.to_string(), path.clone()));
            }
        }
        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(dirs)
    }
}

impl ImageSource for ImageFolderLoader {
    fn classes(&self) -> Result<ClassMap> {
        let dirs = self.class_dirs()?;
        Ok(ClassMap::new(dirs.into_iter().map(|(name, _)| name)))
    }

    fn load_all(&self) -> Result<Vec<ImageRecord>> {
        let dirs    = self.class_dirs()?;
        let classes = ClassMap::new(dirs.iter().map(|(name, _)| name.clone()));
        let mut records = Vec::new();

        for (name, dir) in &dirs {
            let label = classes
                .label_of(name)
                .with_context(|| format!("Class '{name}' missing from class map"))?;

            let mut files: Vec<PathBuf> = fs::read_dir(dir)
                .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file())
                .collect();
            files.sort();

            let before = records.len();
            for path in files {
                if is_image_file(&path) {
                    records.push(ImageRecord::new(path.to_string_lossy(), name.clone(), label));
                } else {
                    tracing::warn!("Skipping non-image file '{}'", path.display());
                }
            }
            tracing::debug!("Class '{}' (label {}): {} images", name, label, records.len() - before);
        }

        tracing::info!(
            "Found {} images in {} classes under '{}'",
            records.len(),
            classes.len(),
            self.root.display()
        );
        Ok(records)
    }
}
