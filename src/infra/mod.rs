// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles the concerns that touch the filesystem on behalf of
// the other layers:
//
//   artifact.rs — Saving and loading the trained model
//                 One versioned .mpk file holding the weights,
//                 the NetworkConfig and the preprocessing rule.
//                 Writes go through a temporary file and a rename.
//
//   metrics.rs  — Training metrics logging
//                 Writes epoch-level metrics (loss, accuracy,
//                 precision, recall, F1) to a CSV file.

/// Versioned single-file model artifact
pub mod artifact;

/// Training metrics CSV logger
pub mod metrics;
