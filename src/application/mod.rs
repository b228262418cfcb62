// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one user-facing goal: training, predicting or summarising.
//
// Rules for this layer:
//   - No model math here (that's Layer 5)
//   - No argument parsing or printing (that's Layer 1)
//   - File access goes through Layers 4 and 6
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// Classifying images with a trained checkpoint
pub mod predict_use_case;

// Shape and parameter report for a configuration
pub mod summary_use_case;
