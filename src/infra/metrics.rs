// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// The logger is a progress consumer: it only ever sees
// EpochResult events, and the Trainer never depends on it.
//
// Metrics recorded per epoch:
//   - epoch:      the epoch number (1, 2, 3, ...)
//   - train_loss: mean cross-entropy over the training batches
//   - accuracy:   correct / total on the test partition
//   - precision, recall, f1: macro averages over the classes
//                 present in the test partition or predictions
//
// Output file: <metrics_dir>/metrics.csv
//
// Example CSV output:
//   epoch,train_loss,accuracy,precision,recall,f1
//   1,0.412300,0.951200,0.950800,0.950400,0.950500
//   2,0.121000,0.972100,0.971900,0.971700,0.971800
//
// Rows from later runs are appended to the same file.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::metrics::EpochMetrics;

pub const CSV_HEADER: &str = "epoch,train_loss,accuracy,precision,recall,f1";

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    /// Full path to the CSV file
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.accuracy, m.precision, m.recall, m.f1,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: accuracy={:.4}, f1={:.4}",
            m.epoch,
            m.accuracy,
            m.f1,
        );
        Ok(())
    }

    /// Return the path to the metrics CSV file
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
