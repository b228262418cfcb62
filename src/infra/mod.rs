// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the checkpoint directory:
//
//   checkpoint.rs     model weights via Burn's gzipped MessagePack recorder,
//                     epoch pointers and the TrainConfig JSON
//                     needed to rebuild the model for inference
//
//   class_store.rs    label ↔ class-name mapping (classes.json)
//
//   metrics.rs        per-epoch loss and accuracy CSV
//
// Reference: Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Class name persistence
pub mod class_store;

/// Training metrics CSV logger
pub mod metrics;
