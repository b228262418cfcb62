// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - epoch:      the epoch number (1, 2, 3, ...)
//   - train_loss: average (smoothed) cross-entropy on the training set
//   - train_acc:  top-1 accuracy on the training batches
//   - val_loss:   average cross-entropy on the validation set
//   - val_acc:    top-1 accuracy on the validation set
//
// Output file: checkpoints/metrics.csv
//
//   epoch,train_loss,train_acc,val_loss,val_acc
//   1,2.214500,0.183000,2.089200,0.221000
//   2,1.890100,0.342000,1.854300,0.365000
//
// If val_loss climbs while train_loss keeps falling the model is
// overfitting; CCT's stochastic depth and label smoothing exist
// to push that point further out.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

const HEADER: &str = "epoch,train_loss,train_acc,val_loss,val_acc";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,

    pub train_loss: f64,
    /// Range: [0.0, 1.0]
    pub train_acc: f64,

    /// NaN when the validation set is empty
    pub val_loss: f64,
    /// Range: [0.0, 1.0]
    pub val_acc: f64,
}

impl EpochMetrics {
    pub fn new(
        epoch:      usize,
        train_loss: f64,
        train_acc:  f64,
        val_loss:   f64,
        val_acc:    f64,
    ) -> Self {
        Self { epoch, train_loss, train_acc, val_loss, val_acc }
    }

    /// Validation loss, or training loss when there was nothing to validate on.
    pub fn monitored_loss(&self) -> f64 {
        if self.val_loss.is_finite() { self.val_loss } else { self.train_loss }
    }

    /// True if this epoch beats the best monitored loss so far
    pub fn is_improvement(&self, best_loss: f64) -> bool {
        let loss = self.monitored_loss();
        loss.is_finite() && loss < best_loss
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");

        // Appending across runs keeps earlier curves
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.train_loss,
            m.train_acc,
            m.val_loss,
            m.val_acc,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
