// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the network configuration   (Layer 3 - domain)
//   Step 2: Load + preprocess both partitions    (Layer 4 - data)
//   Step 3: Build the seeded, untrained model    (Layer 5 - ml)
//   Step 4: Run the epoch loop, save artifact    (Layer 5 - ml, Layer 6 - infra)
//
// Every step reports through the caller's ProgressSink. When any
// step fails, a RunFailed event carrying the error text is emitted
// before the error is returned, so a listener never sees a run
// end silently.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::data::{
    loader::{DatasetLoader, DEFAULT_BATCH_SIZE},
    preprocessor::{Polarity, Preprocessor},
};
use crate::domain::{
    metrics::EpochMetrics,
    network::{Hyperparameters, NetworkConfig, WeightInit},
    progress::ProgressEvent,
    traits::ProgressSink,
};
use crate::infra::artifact::ArtifactStore;
use crate::ml::{model::ModelBuilder, trainer::Trainer, TrainBackend};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a training run needs. Serialisable so a run can be
// described in a file as well as on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub train_dir: PathBuf,
    /// Separate test tree. When absent, `holdout_fraction` of the
    /// training tree is held out instead.
    pub test_dir: Option<PathBuf>,
    pub holdout_fraction: f64,
    pub artifact_path: PathBuf,
    pub metrics_dir: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_init: WeightInit,
    pub polarity: Polarity,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let hyper = Hyperparameters::default();
        Self {
            train_dir: PathBuf::from("data/mnist_png/training"),
            test_dir: Some(PathBuf::from("data/mnist_png/testing")),
            holdout_fraction: 0.2,
            artifact_path: PathBuf::from("mnist-model.mpk"),
            metrics_dir: PathBuf::from("runs"),
            epochs: 10,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: hyper.seed,
            learning_rate: hyper.learning_rate,
            momentum: hyper.momentum,
            weight_init: hyper.weight_init,
            polarity: Polarity::default(),
        }
    }
}

impl TrainConfig {
    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            seed: self.seed,
            learning_rate: self.learning_rate,
            momentum: self.momentum,
            weight_init: self.weight_init,
        }
    }
}

/// What a successful run leaves behind.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub metrics: Vec<EpochMetrics>,
    pub artifact: PathBuf,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end.
    pub fn execute(
        &self,
        progress: &mut impl ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<TrainReport> {
        self.run(progress, cancel).inspect_err(|e| {
            tracing::error!("Training failed: {e:#}");
            progress.emit(ProgressEvent::RunFailed { error: format!("{e:#}") });
        })
    }

    fn run(
        &self,
        progress: &mut impl ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<TrainReport> {
        let cfg = &self.config;

        // ── Step 1: Validate the network ──────────────────────────────────────
        let network = NetworkConfig::lenet(cfg.hyperparameters())
            .context("Invalid training hyperparameters")?;

        // ── Step 2: Load both partitions ──────────────────────────────────────
        // The loader shuffles with the run seed, so the sample order is
        // reproducible across runs.
        let loader = DatasetLoader::new(Preprocessor::new(cfg.polarity), cfg.batch_size);
        let (train, test) = match &cfg.test_dir {
            Some(test_dir) => {
                tracing::info!(
                    "Loading training images from '{}', test images from '{}'",
                    cfg.train_dir.display(),
                    test_dir.display()
                );
                loader.load(&cfg.train_dir, test_dir, cfg.seed)
            }
            None => {
                tracing::info!(
                    "Loading images from '{}' with a {:.0}% hold-out",
                    cfg.train_dir.display(),
                    cfg.holdout_fraction * 100.0
                );
                loader.load_with_holdout(&cfg.train_dir, cfg.holdout_fraction, cfg.seed)
            }
        }
        .context("Cannot load the labeled image dataset")?;

        tracing::debug!("Training label counts: {:?}", train.label_counts());
        progress.emit(ProgressEvent::DataReady {
            train_samples: train.sample_count(),
            test_samples: test.sample_count(),
        });

        // ── Step 3: Build the model ───────────────────────────────────────────
        let device = Default::default();
        let model = ModelBuilder::build::<TrainBackend>(&network, &device);

        // ── Step 4: Train and save ────────────────────────────────────────────
        let store = ArtifactStore::new(&cfg.artifact_path);
        let artifact = store.path().to_path_buf();
        let trainer = Trainer::<TrainBackend>::new(network, store, device)
            .with_cancellation(cancel.clone());

        let mut best_accuracy = 0.0;
        let (_, metrics) = trainer
            .train(model, &train, &test, cfg.epochs, &mut |event: ProgressEvent| {
                if let ProgressEvent::EpochResult(m) = &event {
                    if m.is_improvement(best_accuracy) {
                        best_accuracy = m.accuracy;
                        tracing::info!("Best accuracy so far: {:.4} (epoch {})", m.accuracy, m.epoch);
                    }
                }
                progress.emit(event);
            })
            .context("Training run failed")?;

        Ok(TrainReport { metrics, artifact })
    }
}
