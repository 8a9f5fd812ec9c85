// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn model code. Besides the batcher
// in the data layer, nothing else touches burn tensors.
//
// What's in this layer:
//
//   model.rs     — The convolutional digit classifier
//                  • FeatureBlock: conv or max-pool (+ optional ReLU)
//                  • DenseBlock:   fully connected (+ optional ReLU)
//                  • Output:       10 logits, softmax on demand
//                  ModelBuilder seeds and materialises parameters.
//
//   trainer.rs   — The epoch loop
//                  Forward pass, cross-entropy loss, backward pass,
//                  Nesterov SGD step, test-set confusion matrix,
//                  artifact saving on success
//
//   predictor.rs — The inference path
//                  Lazily loads the artifact once, preprocesses an
//                  image with the stored polarity rule, returns the
//                  argmax digit
//
// Backends: NdArray on the CPU by default, Wgpu with the `wgpu`
// feature. Training wraps the inference backend in Autodiff.

use burn::backend::Autodiff;

#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;

pub type TrainBackend = Autodiff<InferBackend>;

/// Convolutional classifier and its seeded builder
pub mod model;

/// Epoch loop with evaluation and artifact export
pub mod trainer;

/// Lazily loaded model handle and single-image prediction
pub mod predictor;
