// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Classifies image files against a trained artifact.
//
// The use case owns one ModelHandle, so however many images it
// classifies, the artifact is read from disk once.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};

use crate::data::preprocessor::Preprocessor;
use crate::infra::artifact::ArtifactStore;
use crate::ml::predictor::{ModelHandle, Prediction, Predictor};

pub struct PredictUseCase {
    predictor: Predictor,
}

impl PredictUseCase {
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        let store = ArtifactStore::new(artifact_path);
        Self::with_handle(Arc::new(ModelHandle::new(store, Default::default())))
    }

    /// Share an existing handle (and its loaded model) with this use case.
    pub fn with_handle(handle: Arc<ModelHandle>) -> Self {
        Self { predictor: Predictor::new(handle) }
    }

    /// Classify a single image file.
    pub fn execute(&self, image_path: &Path) -> Result<Prediction> {
        let image = Preprocessor::open(image_path)?;
        let prediction = self
            .predictor
            .predict(&image)
            .with_context(|| format!("Cannot classify '{}'", image_path.display()))?;

        tracing::info!(
            "'{}' → {} ({:.1}%)",
            image_path.display(),
            prediction.digit,
            prediction.confidence * 100.0
        );
        Ok(prediction)
    }
}
