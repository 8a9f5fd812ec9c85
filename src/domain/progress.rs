// ============================================================
// Layer 3 — Progress Events
// ============================================================
// One event per significant training step. Each event renders
// as exactly one UTF-8 line through Display; consumers (the CLI,
// the metrics CSV, any dashboard) only ever see this stream.

use std::fmt;
use std::path::PathBuf;

use crate::domain::metrics::EpochMetrics;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    DataReady { train_samples: usize, test_samples: usize },
    EpochStarted { epoch: usize, total: usize },
    EpochResult(EpochMetrics),
    RunComplete { artifact: PathBuf },
    RunFailed { error: String },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::DataReady { train_samples, test_samples } => write!(
                f,
                "Data ready: {train_samples} training samples, {test_samples} test samples"
            ),
            ProgressEvent::EpochStarted { epoch, total } => {
                write!(f, "Epoch {epoch}/{total} started")
            }
            ProgressEvent::EpochResult(m) => write!(
                f,
                "Epoch {} complete. Loss: {:.4} Accuracy: {:.4} Precision: {:.4} Recall: {:.4} F1: {:.4}",
                m.epoch, m.train_loss, m.accuracy, m.precision, m.recall, m.f1
            ),
            ProgressEvent::RunComplete { artifact } => {
                write!(f, "Model saved to {}", artifact.display())
            }
            ProgressEvent::RunFailed { error } => write!(f, "Training failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_result_line_has_parseable_metrics() {
        let ev = ProgressEvent::EpochResult(EpochMetrics {
            epoch: 1,
            train_loss: 2.1,
            accuracy: 0.5,
            precision: 0.25,
            recall: 0.125,
            f1: 0.1666,
        });
        let line = ev.to_string();
        assert!(!line.contains('\n'));
        let accuracy: f64 = line
            .split("Accuracy: ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(accuracy, 0.5);
    }
}
