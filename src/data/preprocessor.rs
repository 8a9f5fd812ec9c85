// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns any raster the `image` crate can decode into the
// normalised 28×28×1 DigitTensor the network expects.
//
// Steps (applied in order):
//   1. Reject zero-area images
//   2. Convert to single-channel grayscale, rescaled to [0, 1]
//      (8-bit sources divide by 255, 16-bit by 65535)
//   3. Resample to exactly 28×28 (bilinear / triangle filter)
//   4. Apply the polarity rule
//
// Polarity: the canonical convention is light strokes on a dark
// background (the MNIST convention). The same Preprocessor value
// is used to build every training sample and is persisted in the
// artifact, so inference applies the identical rule.

use std::path::Path;

use image::{
    imageops::{self, FilterType},
    DynamicImage,
};
use serde::{Deserialize, Serialize};

use crate::domain::error::{DigitError, DigitResult};
use crate::domain::sample::{DigitTensor, IMAGE_SIDE};

/// Border brightness above which `Polarity::Auto` treats an image
/// as dark-on-light and inverts it.
const LIGHT_BACKGROUND_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Keep intensities as decoded.
    AsIs,
    /// Always apply `1 - x`.
    Invert,
    /// Invert when the image border is light.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preprocessor {
    polarity: Polarity,
}

impl Preprocessor {
    pub fn new(polarity: Polarity) -> Self {
        Self { polarity }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Open and decode an image file.
    pub fn open(path: &Path) -> DigitResult<DynamicImage> {
        image::open(path).map_err(|e| {
            DigitError::InvalidImage(format!("cannot decode '{}': {e}", path.display()))
        })
    }

    /// Grayscale, rescale, resample to 28×28 and apply the polarity rule.
    pub fn normalize(&self, image: &DynamicImage) -> DigitResult<DigitTensor> {
        let tensor = Self::to_grayscale_28(image)?;
        Ok(self.apply_polarity(tensor))
    }

    pub fn normalize_path(&self, path: &Path) -> DigitResult<DigitTensor> {
        self.normalize(&Self::open(path)?)
    }

    pub fn apply_polarity(&self, tensor: DigitTensor) -> DigitTensor {
        match self.polarity {
            Polarity::AsIs => tensor,
            Polarity::Invert => tensor.invert(),
            Polarity::Auto if tensor.border_mean() > LIGHT_BACKGROUND_THRESHOLD => tensor.invert(),
            Polarity::Auto => tensor,
        }
    }

    /// Steps 1–3 without any polarity handling.
    pub fn to_grayscale_28(image: &DynamicImage) -> DigitResult<DigitTensor> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DigitError::InvalidImage(format!(
                "image has zero area ({width}×{height})"
            )));
        }

        // to_luma32f already maps the source range onto [0, 1]
        let gray = image.to_luma32f();
        let side = IMAGE_SIDE as u32;
        let resized = if (width, height) == (side, side) {
            gray
        } else {
            imageops::resize(&gray, side, side, FilterType::Triangle)
        };

        let pixels = resized
            .into_raw()
            .into_iter()
            .map(|p| if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 })
            .collect();
        DigitTensor::new(pixels)
    }
}
