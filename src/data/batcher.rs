// ============================================================
// Layer 4 — Digit Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<LabeledSample>
// into device tensors.
//
//   Input:  N samples, each 784 pixels in [0, 1]
//   Output: images  [N, 1, 28, 28]  (float)
//           targets [N]             (int, class index)
//
// The host-side labels are kept alongside the tensors so the
// evaluation loop can fill its confusion matrix without reading
// the target tensor back from the device.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::domain::sample::{LabeledSample, IMAGE_PIXELS, IMAGE_SIDE};

#[derive(Debug, Clone)]
pub struct DigitBatch<B: Backend> {
    /// Shape: [batch_size, 1, 28, 28]
    pub images: Tensor<B, 4>,

    /// Shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,

    pub labels: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct DigitBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> DigitBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<LabeledSample, DigitBatch<B>> for DigitBatcher<B> {
    fn batch(&self, items: Vec<LabeledSample>) -> DigitBatch<B> {
        let batch_size = items.len();

        let mut pixels = Vec::with_capacity(batch_size * IMAGE_PIXELS);
        for item in &items {
            pixels.extend_from_slice(item.image().pixels());
        }
        let labels: Vec<usize> = items.iter().map(|s| s.label() as usize).collect();
        let targets: Vec<i64> = labels.iter().map(|&l| l as i64).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 1, IMAGE_SIDE, IMAGE_SIDE])
                .convert::<B::FloatElem>(),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets, [batch_size]).convert::<B::IntElem>(),
            &self.device,
        );

        DigitBatch { images, targets, labels }
    }
}
