// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from an image folder on disk to tensor batches.
//
//   data/images/<class>/<file>
//       │
//       ▼
//   ImageFolderLoader → lists files, assigns labels by class folder
//       │
//       ▼
//   Preprocessor      → decode, resize, normalise, CHW floats
//       │
//       ▼
//   split_train_val   → shuffled train / validation split
//       │
//       ▼
//   ImageDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher      → stacks samples into [B, C, H, W] tensors
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Lists labelled images from a class-per-folder directory
pub mod loader;

/// Decodes and normalises images into CHW floats
pub mod preprocessor;

/// Implements Burn's Dataset trait for image samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
