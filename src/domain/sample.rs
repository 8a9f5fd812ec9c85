// ============================================================
// Layer 3 — Digit Tensor and Labeled Sample
// ============================================================
// A DigitTensor is the normalised 28×28×1 intensity grid every
// other layer agrees on. Values are row-major, one channel,
// each in [0, 1].
//
// A LabeledSample pairs one DigitTensor with its class label.
// Both are immutable once built: the only way to change the
// pixels is to produce a new tensor (e.g. `invert`).

use serde::{Deserialize, Serialize};

use crate::domain::error::{DigitError, DigitResult};

/// Height and width of every normalised image.
pub const IMAGE_SIDE: usize = 28;

/// Number of pixels in one normalised image (28 × 28 × 1).
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;

/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitTensor {
    pixels: Vec<f32>,
}

impl DigitTensor {
    /// Build a tensor from exactly 784 values in [0, 1].
    pub fn new(pixels: Vec<f32>) -> DigitResult<Self> {
        if pixels.len() != IMAGE_PIXELS {
            return Err(DigitError::InvalidImage(format!(
                "expected {IMAGE_PIXELS} pixels, got {}",
                pixels.len()
            )));
        }
        if let Some(bad) = pixels.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(DigitError::InvalidImage(format!(
                "pixel value {bad} outside [0, 1]"
            )));
        }
        Ok(Self { pixels })
    }

    /// Every pixel set to `value` (clamped into [0, 1]).
    #[cfg(test)]
    pub fn filled(value: f32) -> Self {
        Self { pixels: vec![value.clamp(0.0, 1.0); IMAGE_PIXELS] }
    }

    /// Shape as [height, width, channels].
    pub fn shape(&self) -> [usize; 3] {
        [IMAGE_SIDE, IMAGE_SIDE, 1]
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.pixels[row * IMAGE_SIDE + col]
    }

    /// Polarity inversion: every pixel x becomes 1 - x.
    pub fn invert(&self) -> Self {
        Self { pixels: self.pixels.iter().map(|p| 1.0 - p).collect() }
    }

    /// Mean intensity of the outermost ring of pixels.
    /// A bright border means a light background.
    pub fn border_mean(&self) -> f32 {
        let last = IMAGE_SIDE - 1;
        let (sum, count) = (0..IMAGE_SIDE)
            .flat_map(|r| (0..IMAGE_SIDE).map(move |c| (r, c)))
            .filter(|&(r, c)| r == 0 || c == 0 || r == last || c == last)
            .fold((0.0f32, 0usize), |(s, n), (r, c)| (s + self.at(r, c), n + 1));
        sum / count as f32
    }
}

/// One normalised training image plus its digit label in [0, 9].
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    image: DigitTensor,
    label: u8,
}

impl LabeledSample {
    pub fn new(image: DigitTensor, label: u8) -> DigitResult<Self> {
        if label as usize >= NUM_CLASSES {
            return Err(DigitError::Dataset(format!("label {label} outside 0..=9")));
        }
        Ok(Self { image, label })
    }

    pub fn image(&self) -> &DigitTensor {
        &self.image
    }

    pub fn label(&self) -> u8 {
        self.label
    }
}

/// Index of the largest value; ties resolve to the lowest index.
/// NaN entries never win. Returns 0 for an empty slice.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
