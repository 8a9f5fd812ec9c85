// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that define the core
// concepts of the system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Think of this layer as the "dictionary" of the system:
// it defines what things ARE, not how they work.

/// Error taxonomy shared by every layer below the CLI
pub mod error;

/// Normalised 28×28×1 tensors and labeled samples
pub mod sample;

/// LayerSpec / NetworkConfig: the validated CNN description
pub mod network;

/// Confusion matrix and per-epoch metrics
pub mod metrics;

/// Progress events emitted during training
pub mod progress;

/// Core abstractions (traits) that other layers implement
pub mod traits;
