// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from labeled image folders
// all the way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   root/<digit>/*.png
//       │
//       ▼
//   DatasetLoader     → walks label dirs, sorts, shuffles with the seed
//       │
//       ▼
//   Preprocessor      → grayscale, [0, 1], 28×28, polarity rule
//       │
//       ▼
//   DataPartition     → restartable batches, implements Burn's Dataset
//       │
//       ▼
//   DigitBatcher      → stacks samples into [N, 1, 28, 28] tensors
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Each module is responsible for exactly one step.

/// Reads labeled image trees from disk
pub mod loader;

/// Decodes and normalises a single image
pub mod preprocessor;

/// Holds preprocessed samples and serves them in batches
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits a single tree into train/test sets
pub mod splitter;
