// ============================================================
// Layer 6 — Artifact Store
// ============================================================
// Saves and restores a trained model as ONE versioned file,
// using Burn's NamedMpkFileRecorder (MessagePack, full precision).
//
// What goes into the artifact:
//   1. format_version      — bumped whenever the layout changes
//   2. network (JSON)      — the NetworkConfig, needed to rebuild
//                            the module tree before loading weights
//   3. preprocessing (JSON)— the Preprocessor, so inference applies
//                            the same polarity rule as training
//   4. model record        — all learned parameters
//
// Saving is atomic: the record is written to a hidden sibling
// file and renamed over the target only once it is complete.
// A failed save leaves any previous artifact untouched.
//
// The recorder always uses the `.mpk` extension; paths with any
// other extension are normalised to it.
//
// Burn modules are Send but not Sync, so a loaded model is kept
// behind a mutex that is held only to clone it out. Clones share
// tensor storage; the forward pass runs on the clone, unlocked.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder},
};

use crate::data::preprocessor::Preprocessor;
use crate::domain::error::{DigitError, DigitResult};
use crate::domain::network::NetworkConfig;
use crate::ml::model::{DigitModel, DigitModelRecord};

pub const FORMAT_VERSION: usize = 1;

pub const ARTIFACT_EXTENSION: &str = "mpk";

#[derive(Record)]
pub struct ArtifactRecord<B: Backend> {
    format_version: usize,
    network: String,
    preprocessing: String,
    model: DigitModelRecord<B>,
}

/// A model restored from disk together with the settings it was
/// trained with. Shareable across threads.
#[derive(Debug)]
pub struct LoadedArtifact<B: Backend> {
    model: Mutex<DigitModel<B>>,
    pub network: NetworkConfig,
    pub preprocessor: Preprocessor,
}

impl<B: Backend> LoadedArtifact<B> {
    pub fn new(model: DigitModel<B>, network: NetworkConfig, preprocessor: Preprocessor) -> Self {
        Self { model: Mutex::new(model), network, preprocessor }
    }

    /// An independent handle on the restored model.
    pub fn model(&self) -> DigitModel<B> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into().with_extension(ARTIFACT_EXTENSION) }
    }

    /// Where the artifact lives (always ending in `.mpk`).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the model, its network config and preprocessing rule,
    /// replacing any previous artifact.
    pub fn save<B: Backend>(
        &self,
        model: &DigitModel<B>,
        network: &NetworkConfig,
        preprocessor: &Preprocessor,
    ) -> DigitResult<PathBuf> {
        let record = ArtifactRecord {
            format_version: FORMAT_VERSION,
            network: to_json(network)?,
            preprocessing: to_json(preprocessor)?,
            model: model.clone().into_record(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                DigitError::Serialization(format!("cannot create '{}': {e}", parent.display()))
            })?;
        }

        let partial = self.partial_path();
        let written = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .record(record, partial.clone())
            .map_err(|e| DigitError::Serialization(format!("cannot write model record: {e}")))
            .and_then(|_| {
                fs::rename(&partial, &self.path).map_err(|e| {
                    DigitError::Serialization(format!(
                        "cannot move artifact into '{}': {e}",
                        self.path.display()
                    ))
                })
            });

        if let Err(e) = written {
            // Whatever was half-written must not linger next to the artifact.
            let _ = fs::remove_file(&partial);
            return Err(e);
        }

        tracing::debug!("Saved artifact '{}'", self.path.display());
        Ok(self.path.clone())
    }

    /// Read the artifact back onto `device`.
    pub fn load<B: Backend>(&self, device: &B::Device) -> DigitResult<LoadedArtifact<B>> {
        if !self.exists() {
            return Err(DigitError::ModelNotFound(self.path.clone()));
        }

        let record: ArtifactRecord<B> = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(self.path.clone(), device)
            .map_err(|e| {
                DigitError::Serialization(format!(
                    "cannot read artifact '{}': {e}",
                    self.path.display()
                ))
            })?;

        if record.format_version != FORMAT_VERSION {
            return Err(DigitError::Serialization(format!(
                "artifact '{}' has format version {}, expected {FORMAT_VERSION}",
                self.path.display(),
                record.format_version
            )));
        }

        let network: NetworkConfig = from_json(&record.network)?;
        let preprocessor: Preprocessor = from_json(&record.preprocessing)?;
        let model = DigitModel::<B>::init(&network, device).load_record(record.model);

        tracing::info!("Loaded model from '{}'", self.path.display());
        Ok(LoadedArtifact::new(model, network, preprocessor))
    }

    /// Hidden sibling used while writing: `<dir>/.<stem>.partial.mpk`.
    fn partial_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        self.path.with_file_name(format!(".{stem}.partial.{ARTIFACT_EXTENSION}"))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> DigitResult<String> {
    serde_json::to_string(value).map_err(|e| DigitError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> DigitResult<T> {
    serde_json::from_str(json)
        .map_err(|e| DigitError::Serialization(format!("malformed artifact metadata: {e}")))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::Polarity;
    use crate::ml::model::{tests::parameter_snapshot, ModelBuilder};
    use crate::ml::InferBackend;

    fn saved_model(store: &ArtifactStore) -> DigitModel<InferBackend> {
        let model = ModelBuilder::build::<InferBackend>(&NetworkConfig::default(), &Default::default());
        store
            .save(&model, &NetworkConfig::default(), &Preprocessor::new(Polarity::Invert))
            .unwrap();
        model
    }

    #[test]
    fn test_missing_artifact_is_model_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("mnist-model.mpk"));
        let err = store.load::<InferBackend>(&Default::default()).unwrap_err();
        assert!(matches!(err, DigitError::ModelNotFound(_)));
        // No partial state left behind
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_round_trip_restores_parameters_and_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("nested").join("mnist-model.mpk"));
        let original = saved_model(&store);

        assert!(store.exists());
        let loaded = store.load::<InferBackend>(&Default::default()).unwrap();
        assert_eq!(parameter_snapshot(&original), parameter_snapshot(&loaded.model()));
        assert_eq!(loaded.network, NetworkConfig::default());
        assert_eq!(loaded.preprocessor.polarity(), Polarity::Invert);
    }

    #[test]
    fn test_loaded_artifact_is_shareable_across_threads() {
        fn assert_shareable<T: Send + Sync>() {}
        assert_shareable::<LoadedArtifact<InferBackend>>();
    }

    #[test]
    fn test_save_leaves_no_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("mnist-model.mpk"));
        saved_model(&store);
        saved_model(&store);
        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["mnist-model.mpk".to_string()]);
    }

    #[test]
    fn test_extension_is_normalised() {
        let store = ArtifactStore::new("out/model.bin");
        assert_eq!(store.path(), Path::new("out/model.mpk"));
        assert_eq!(store.partial_path(), Path::new("out/.model.partial.mpk"));
    }

    #[test]
    fn test_corrupt_artifact_is_a_serialization_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("mnist-model.mpk"));
        fs::write(store.path(), b"garbage").unwrap();
        let err = store.load::<InferBackend>(&Default::default()).unwrap_err();
        assert!(matches!(err, DigitError::Serialization(_)));
    }
}
