// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model code lives here.
//
//   shape.rs         tokenizer output size bookkeeping
//   settings.rs      initializer names and the settings mapping
//   tokenizer.rs     convolutional tokenizer
//   embedding.rs     learnable / sinusoidal positional embedding
//   block.rs         transformer encoder block with stochastic depth
//   pooling.rs       sequence pooling (replaces the class token)
//   model.rs         CctConfig and the assembled CctModel
//   trainer.rs       training loop with validation and checkpoints
//   inferencer.rs    loads a checkpoint and classifies images
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Hassani et al. (2021) Escaping the Big Data Paradigm
//            with Compact Transformers

pub mod shape;
pub mod settings;
pub mod tokenizer;
pub mod embedding;
pub mod block;
pub mod pooling;

/// CCT configuration and model
pub mod model;

/// Training loop with validation, metrics and checkpointing
pub mod trainer;

/// Inference engine   loads a checkpoint and classifies images
pub mod inferencer;
