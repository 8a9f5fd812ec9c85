// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training or classifying an image).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination

// The training workflow
pub mod train_use_case;

// Background training with a progress stream and cancellation
pub mod training_job;

// The single-image classification workflow
pub mod predict_use_case;
