// ============================================================
// Layer 3 — Image Domain Types
// ============================================================
// An ImageRecord points at one labelled image file on disk.
// No pixels live here: decoding happens in the data layer.
//
// A ClassMap fixes the label index of each class name. Index
// order is alphabetical so the same folder always yields the
// same labels, at training and at inference time.

use serde::{Deserialize, Serialize};

/// One labelled image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Path of the image file
    pub source: String,

    /// Name of the folder the image was found in
    pub class_name: String,

    /// Index of `class_name` in the ClassMap
    pub label: usize,
}

impl ImageRecord {
    pub fn new(source: impl Into<String>, class_name: impl Into<String>, label: usize) -> Self {
        Self {
            source:     source.into(),
            class_name: class_name.into(),
            label,
        }
    }
}

/// Ordered class names; a label is a position in this list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    names: Vec<String>,
}

impl ClassMap {
    /// Build a map from class names, sorted and de-duplicated.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn label_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()
    }

    pub fn name_of(&self, label: usize) -> Option<&str> {
        self.names.get(label).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One scored class for a classified image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label:      usize,
    pub class_name: String,
    /// Softmax probability in [0, 1]
    pub confidence: f32,
}
