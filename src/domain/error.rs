// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the core can produce, as one typed enum.
//
//   Dataset        — missing / empty / unlabeled directory tree
//   Configuration  — invalid topology or hyperparameters
//   InvalidImage   — undecodable or zero-area raster (per call)
//   Training       — numerical failure inside the epoch loop
//   Serialization  — artifact read or write failure
//   ModelNotFound  — inference with no artifact on disk
//   Cancelled      — run stopped at an epoch boundary
//
// The application and CLI layers wrap these in anyhow::Error
// with extra context; everything below them returns DigitError.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigitError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("no trained model found at '{}'", .0.display())]
    ModelNotFound(PathBuf),

    #[error("training cancelled after {completed_epochs} completed epoch(s)")]
    Cancelled { completed_epochs: usize },
}

impl DigitError {
    /// Errors scoped to one input; the next call may well succeed.
    pub fn is_per_call(&self) -> bool {
        matches!(self, DigitError::InvalidImage(_))
    }
}

pub type DigitResult<T> = Result<T, DigitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_human_readable() {
        let err = DigitError::ModelNotFound(PathBuf::from("mnist-model.mpk"));
        assert_eq!(err.to_string(), "no trained model found at 'mnist-model.mpk'");

        let err = DigitError::Cancelled { completed_epochs: 2 };
        assert!(err.to_string().contains("2 completed epoch"));
    }

    #[test]
    fn test_per_call_classification() {
        assert!(DigitError::InvalidImage("zero area".into()).is_per_call());
        assert!(!DigitError::Training("loss is NaN".into()).is_per_call());
        assert!(!DigitError::ModelNotFound(PathBuf::from("m.mpk")).is_per_call());
    }
}
