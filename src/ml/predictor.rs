// ============================================================
// Layer 5 — Predictor
// ============================================================
// Single-image inference against a persisted artifact.
//
// ModelHandle is the explicitly owned, lazily loaded model: the
// hosting application creates one, wraps it in an Arc and hands
// it to every Predictor. The first call loads the artifact under
// a mutex (concurrent first calls load exactly once); after that
// the artifact is read through a OnceLock and every call runs its
// forward pass on its own clone of the model.
//
// The predictor never sees an in-training model. It only reads
// what the Trainer published through the ArtifactStore.
//
// A Predictor is Send + Sync: clones (or one Arc'd instance) can
// serve inference from any number of threads at once.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, OnceLock, PoisonError,
};

use burn::prelude::*;
use image::DynamicImage;

use crate::domain::error::{DigitError, DigitResult};
use crate::domain::sample::{argmax, DigitTensor, NUM_CLASSES};
use crate::infra::artifact::{ArtifactStore, LoadedArtifact};
use crate::ml::InferBackend;

pub struct ModelHandle<B: Backend = InferBackend> {
    store: ArtifactStore,
    device: B::Device,
    loaded: OnceLock<Arc<LoadedArtifact<B>>>,
    load_lock: Mutex<()>,
    loads: AtomicUsize,
}

impl<B: Backend> ModelHandle<B> {
    pub fn new(store: ArtifactStore, device: B::Device) -> Self {
        Self {
            store,
            device,
            loaded: OnceLock::new(),
            load_lock: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// The loaded artifact, reading it from disk on first use.
    /// A failed load is not cached; the next call tries again.
    pub fn get(&self) -> DigitResult<Arc<LoadedArtifact<B>>> {
        if let Some(loaded) = self.loaded.get() {
            return Ok(Arc::clone(loaded));
        }

        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(loaded) = self.loaded.get() {
            return Ok(Arc::clone(loaded));
        }

        let loaded = Arc::new(self.store.load::<B>(&self.device)?);
        let loads = self.loads.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(
            "Model ready: {} layers, polarity {:?} (load #{loads})",
            loaded.network.layers().len(),
            loaded.preprocessor.polarity()
        );
        let _ = self.loaded.set(Arc::clone(&loaded));
        Ok(loaded)
    }
}

#[cfg(test)]
impl<B: Backend> ModelHandle<B> {
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Number of times the artifact was actually read from disk.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }
}

/// A predicted digit and the model's probability for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub digit: u8,
    pub confidence: f32,
}

impl Prediction {
    fn from_probabilities(probabilities: &[f32; NUM_CLASSES]) -> Self {
        let digit = argmax(probabilities);
        Self { digit: digit as u8, confidence: probabilities[digit] }
    }
}

pub struct Predictor<B: Backend = InferBackend> {
    handle: Arc<ModelHandle<B>>,
}

impl<B: Backend> Clone for Predictor<B> {
    fn clone(&self) -> Self {
        Self { handle: Arc::clone(&self.handle) }
    }
}

impl<B: Backend> Predictor<B> {
    pub fn new(handle: Arc<ModelHandle<B>>) -> Self {
        Self { handle }
    }

    /// The most likely digit for `image`, with its probability.
    pub fn predict(&self, image: &DynamicImage) -> DigitResult<Prediction> {
        Ok(Prediction::from_probabilities(&self.probabilities(image)?))
    }

    /// Full softmax distribution over the ten classes.
    pub fn probabilities(&self, image: &DynamicImage) -> DigitResult<[f32; NUM_CLASSES]> {
        let artifact = self.handle.get()?;
        // Same preprocessing (and polarity) the model was trained with.
        let tensor = artifact.preprocessor.normalize(image)?;
        self.forward(&artifact, &tensor)
    }

    fn forward(
        &self,
        artifact: &LoadedArtifact<B>,
        tensor: &DigitTensor,
    ) -> DigitResult<[f32; NUM_CLASSES]> {
        let [height, width, channels] = tensor.shape();
        let input = Tensor::<B, 4>::from_data(
            TensorData::new(tensor.pixels().to_vec(), [1, channels, height, width])
                .convert::<B::FloatElem>(),
            &self.handle.device,
        );
        let values = artifact
            .model()
            .probabilities(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| DigitError::Serialization(format!("cannot read model output: {e:?}")))?;

        let mut out = [0.0f32; NUM_CLASSES];
        for (slot, v) in out.iter_mut().zip(values) {
            *slot = v;
        }
        tracing::debug!("Class probabilities: {:?}", out);
        Ok(out)
    }
}

#[cfg(test)]
impl<B: Backend> Predictor<B> {
    /// Distribution for an already normalised tensor; no
    /// preprocessing or polarity rule is applied.
    pub fn tensor_probabilities(&self, tensor: &DigitTensor) -> DigitResult<[f32; NUM_CLASSES]> {
        let artifact = self.handle.get()?;
        self.forward(&artifact, tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::{Polarity, Preprocessor};
    use crate::domain::network::NetworkConfig;
    use crate::domain::sample::IMAGE_SIDE;
    use crate::ml::model::ModelBuilder;
    use image::{GrayImage, Luma, RgbImage};
    use std::{path::Path, sync::Barrier, thread};

    fn saved_predictor(dir: &Path, polarity: Polarity) -> (Arc<ModelHandle>, Predictor) {
        let store = ArtifactStore::new(dir.join("mnist-model.mpk"));
        let model = ModelBuilder::build::<InferBackend>(&NetworkConfig::default(), &Default::default());
        store.save(&model, &NetworkConfig::default(), &Preprocessor::new(polarity)).unwrap();
        let handle = Arc::new(ModelHandle::new(store, Default::default()));
        (handle.clone(), Predictor::new(handle))
    }

    fn fixed_inputs() -> Vec<DigitTensor> {
        (0..8)
            .map(|k| {
                let pixels = (0..IMAGE_SIDE * IMAGE_SIDE)
                    .map(|i| ((i * (k + 3)) % 17) as f32 / 16.0)
                    .collect();
                DigitTensor::new(pixels).unwrap()
            })
            .collect()
    }

    fn digit_for(predictor: &Predictor, tensor: &DigitTensor) -> usize {
        argmax(&predictor.tensor_probabilities(tensor).unwrap())
    }

    #[test]
    fn test_predict_before_training_is_model_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = Arc::new(ModelHandle::<InferBackend>::new(
            ArtifactStore::new(tmp.path().join("mnist-model.mpk")),
            Default::default(),
        ));
        let predictor = Predictor::new(handle.clone());
        let img = DynamicImage::ImageLuma8(GrayImage::new(28, 28));

        assert!(matches!(predictor.predict(&img), Err(DigitError::ModelNotFound(_))));
        assert!(!handle.is_loaded());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_predictions_are_digits() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, predictor) = saved_predictor(tmp.path(), Polarity::Auto);
        let mut inputs = fixed_inputs();
        inputs.push(DigitTensor::filled(0.0));
        inputs.push(DigitTensor::filled(1.0));
        for t in &inputs {
            assert!(digit_for(&predictor, t) <= 9);
        }
    }

    #[test]
    fn test_saved_model_predicts_like_the_original() {
        let tmp = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = ModelBuilder::build::<InferBackend>(&NetworkConfig::default(), &device);
        let store = ArtifactStore::new(tmp.path().join("mnist-model.mpk"));
        store.save(&model, &NetworkConfig::default(), &Preprocessor::default()).unwrap();
        let predictor = Predictor::new(Arc::new(ModelHandle::<InferBackend>::new(store, device.clone())));

        for t in fixed_inputs() {
            let input = Tensor::<InferBackend, 4>::from_data(
                TensorData::new(t.pixels().to_vec(), [1, 1, 28, 28]),
                &device,
            );
            let original = model.probabilities(input).into_data().to_vec::<f32>().unwrap();
            assert_eq!(digit_for(&predictor, &t), argmax(&original));
        }
    }

    #[test]
    fn test_artifact_is_loaded_once() {
        let tmp = tempfile::tempdir().unwrap();
        let (handle, predictor) = saved_predictor(tmp.path(), Polarity::Auto);
        let img = DynamicImage::ImageRgb8(RgbImage::new(64, 40));

        assert!(!handle.is_loaded());
        for _ in 0..3 {
            predictor.predict(&img).unwrap();
            predictor.clone().probabilities(&img).unwrap();
        }
        assert_eq!(handle.load_count(), 1);
    }

    #[test]
    fn test_concurrent_first_calls_load_once() {
        const THREADS: usize = 8;
        let tmp = tempfile::tempdir().unwrap();
        let (handle, predictor) = saved_predictor(tmp.path(), Polarity::Auto);
        let input = fixed_inputs().remove(0);
        let barrier = Barrier::new(THREADS);

        let digits: Vec<usize> = thread::scope(|scope| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    let predictor = predictor.clone();
                    let (barrier, input) = (&barrier, &input);
                    scope.spawn(move || {
                        barrier.wait();
                        digit_for(&predictor, input)
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(handle.load_count(), 1);
        assert!(digits.iter().all(|&d| d == digits[0]));
    }

    #[test]
    fn test_predictor_is_shareable_across_threads() {
        fn assert_shareable<T: Send + Sync>() {}
        assert_shareable::<Predictor>();
        assert_shareable::<Arc<ModelHandle>>();
    }

    #[test]
    fn test_stored_polarity_is_applied() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, predictor) = saved_predictor(tmp.path(), Polarity::Invert);
        let black = DynamicImage::ImageLuma8(GrayImage::new(28, 28));
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(28, 28, Luma([255])));

        // Inverting a black image gives the all-ones tensor
        let expected = digit_for(&predictor, &DigitTensor::filled(1.0));
        assert_eq!(predictor.predict(&black).unwrap().digit as usize, expected);
        let expected = digit_for(&predictor, &DigitTensor::filled(0.0));
        assert_eq!(predictor.predict(&white).unwrap().digit as usize, expected);
    }

    #[test]
    fn test_probabilities_form_a_distribution() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, predictor) = saved_predictor(tmp.path(), Polarity::Auto);
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 100, Luma([30])));
        let p = predictor.probabilities(&img).unwrap();
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-4);

        let prediction = predictor.predict(&img).unwrap();
        assert_eq!(prediction.confidence, p[prediction.digit as usize]);
    }

    #[test]
    fn test_argmax_ties_go_to_the_lowest_digit() {
        let mut p = [0.05f32; NUM_CLASSES];
        p[3] = 0.3;
        p[7] = 0.3;
        assert_eq!(Prediction::from_probabilities(&p), Prediction { digit: 3, confidence: 0.3 });
    }
}
