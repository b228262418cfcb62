use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One preprocessed image: CHW floats plus its class label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    pub pixels: Vec<f32>,
    pub label:  usize,
}

pub struct ImageDataset {
    samples: Vec<ImageSample>,
}

impl ImageDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self { Self { samples } }

    /// Number of samples per label, indexed by label.
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for sample in &self.samples {
            if let Some(count) = counts.get_mut(sample.label) {
                *count += 1;
            }
        }
        counts
    }
}

impl Dataset<ImageSample> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
