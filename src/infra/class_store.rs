// ============================================================
// Layer 6 — Class Store
// ============================================================
// Persists the label ↔ class-name mapping next to the weights.
// Training and inference must agree on it: label i is row i of
// the classifier head.
//
// Output file: checkpoints/classes.json
//   ["cat", "dog", "horse"]

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::image::ClassMap;

pub struct ClassStore {
    path: PathBuf,
}

impl ClassStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { path: dir.as_ref().join("classes.json") }
    }

    pub fn save(&self, classes: &ClassMap) -> Result<()> {
        let json = serde_json::to_string_pretty(classes.names())?;
        fs::write(&self.path, json)
            .with_context(|| format!("Cannot write classes to '{}'", self.path.display()))?;
        tracing::debug!("Saved {} class names", classes.len());
        Ok(())
    }

    pub fn load(&self) -> Result<ClassMap> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read classes from '{}'", self.path.display()))?;
        let names: Vec<String> = serde_json::from_str(&json)
            .with_context(|| format!("Malformed class list '{}'", self.path.display()))?;
        Ok(ClassMap::new(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_keeps_label_order() {
        let tmp   = tempfile::tempdir().unwrap();
        let store = ClassStore::new(tmp.path());
        let map   = ClassMap::new(["dog", "cat", "bird"]);
        store.save(&map).unwrap();

        let back = store.load().unwrap();
        assert_eq!(back.len(), 3);
        for label in 0..3 {
            assert_eq!(back.name_of(label), map.name_of(label));
        }
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(ClassStore::new(tmp.path()).load().is_err());
    }
}
