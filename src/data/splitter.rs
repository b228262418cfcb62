// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples and splits them into two sets:
//   - Training set:   used to update model weights
//   - Validation set: used to measure accuracy on unseen images
//
// The loader lists images class by class, so without shuffling
// the validation set would only hold the last classes.
//
// With a seed the split is reproducible across runs; without one
// it draws from the thread RNG.
//
// Reference: rand crate documentation

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` and split into (train, validation).
///
/// `train_fraction` is clamped to [0, 1].
pub fn split_train_val<T>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    seed:           Option<u64>,
) -> (Vec<T>, Vec<T>) {
    match seed {
        Some(seed) => samples.shuffle(&mut StdRng::seed_from_u64(seed)),
        None       => samples.shuffle(&mut rand::thread_rng()),
    }

    let total    = samples.len();
    let fraction = train_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * fraction).round() as usize;
    let split_at = split_at.min(total);

    // split_off(n) leaves [0..n) in samples and returns [n..total)
    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}
