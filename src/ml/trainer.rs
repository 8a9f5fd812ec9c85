// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop using Burn's DataLoader and Nesterov SGD.
//
// Per epoch:
//   1. Check the cancellation token (epoch boundary only)
//   2. Training phase: one forward + backward pass and one
//      optimiser step per mini-batch (TrainBackend, autodiff)
//   3. Evaluation phase: model.valid() on the inner backend,
//      forward passes only, filling a confusion matrix
//   4. Emit one EpochResult event
//
// After the last epoch the model is exported through the
// ArtifactStore and a RunComplete event carries its path. Any
// error aborts the run before the export, so a failed run never
// writes a partial artifact.
//
// The trainer takes the model by value and hands it back at the
// end; nothing else can observe it mid-training.

use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use tokio_util::sync::CancellationToken;

use crate::data::{batcher::DigitBatcher, dataset::DataPartition};
use crate::domain::error::{DigitError, DigitResult};
use crate::domain::metrics::{ConfusionMatrix, EpochMetrics};
use crate::domain::network::NetworkConfig;
use crate::domain::progress::ProgressEvent;
use crate::domain::sample::{argmax, NUM_CLASSES};
use crate::domain::traits::ProgressSink;
use crate::infra::artifact::ArtifactStore;
use crate::ml::model::DigitModel;

pub struct Trainer<B: AutodiffBackend> {
    network: NetworkConfig,
    store: ArtifactStore,
    device: B::Device,
    cancel: CancellationToken,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(network: NetworkConfig, store: ArtifactStore, device: B::Device) -> Self {
        Self { network, store, device, cancel: CancellationToken::new() }
    }

    /// Stop between epochs once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fit `model` for `epochs` passes over `train`, evaluating on
    /// `test` after each one, then save the artifact together with
    /// the Preprocessor both partitions were built with.
    pub fn train(
        &self,
        mut model: DigitModel<B>,
        train: &DataPartition,
        test: &DataPartition,
        epochs: usize,
        progress: &mut impl ProgressSink,
    ) -> DigitResult<(DigitModel<B>, Vec<EpochMetrics>)> {
        if epochs == 0 {
            return Err(DigitError::Configuration("epochs must be at least 1".into()));
        }
        if train.sample_count() == 0 || test.sample_count() == 0 {
            return Err(DigitError::Dataset(
                "training and test partitions must both contain samples".into(),
            ));
        }
        let preprocessor = train.preprocessor();
        if test.preprocessor() != preprocessor {
            return Err(DigitError::Configuration(format!(
                "training samples use {:?} polarity but test samples use {:?}",
                preprocessor.polarity(),
                test.preprocessor().polarity()
            )));
        }

        let hyper = self.network.hyper();
        let mut optim = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(hyper.momentum)
                    .with_dampening(0.0)
                    .with_nesterov(true),
            ))
            .init();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);

        // ── Data loaders ──────────────────────────────────────────────────────
        // No shuffling here: the partitions already carry the seeded order,
        // and every iter() call restarts from the first sample.
        let train_loader = DataLoaderBuilder::new(DigitBatcher::<B>::new(self.device.clone()))
            .batch_size(train.batch_size())
            .build(train.clone());
        let test_loader =
            DataLoaderBuilder::new(DigitBatcher::<B::InnerBackend>::new(self.device.clone()))
                .batch_size(test.batch_size())
                .build(test.clone());

        tracing::info!(
            "Training for {} epochs: {} batches/epoch, lr={}, momentum={}",
            epochs,
            train.num_batches(),
            hyper.learning_rate,
            hyper.momentum
        );

        let mut history = Vec::with_capacity(epochs);
        for epoch in 1..=epochs {
            self.check_cancelled(epoch - 1)?;
            progress.emit(ProgressEvent::EpochStarted { epoch, total: epochs });

            // ── Training phase ────────────────────────────────────────────────
            let mut loss_sum = 0.0f64;
            let mut batches = 0usize;
            for batch in train_loader.iter() {
                let logits = model.forward(batch.images);
                let loss = loss_fn.forward(logits, batch.targets);

                let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
                if !loss_value.is_finite() {
                    return Err(DigitError::Training(format!(
                        "loss became {loss_value} in epoch {epoch}, batch {}",
                        batches + 1
                    )));
                }
                loss_sum += loss_value;
                batches += 1;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(hyper.learning_rate, model, grads);
            }
            let train_loss = loss_sum / batches.max(1) as f64;

            // ── Evaluation phase ──────────────────────────────────────────────
            let model_valid = model.valid();
            let mut matrix = ConfusionMatrix::new();
            for batch in test_loader.iter() {
                let logits = model_valid.forward(batch.images);
                let scores = logits
                    .into_data()
                    .convert::<f32>()
                    .to_vec::<f32>()
                    .map_err(|e| DigitError::Training(format!("cannot read logits: {e:?}")))?;
                for (row, &label) in scores.chunks(NUM_CLASSES).zip(&batch.labels) {
                    matrix.record(label, argmax(row));
                }
            }

            let metrics = EpochMetrics::from_confusion(epoch, train_loss, &matrix);
            tracing::debug!(
                "Epoch {} evaluated {} samples, {} correct",
                epoch,
                matrix.total(),
                matrix.correct()
            );
            progress.emit(ProgressEvent::EpochResult(metrics.clone()));
            history.push(metrics);
        }

        self.check_cancelled(epochs)?;
        let artifact = self.store.save(&model.valid(), &self.network, &preprocessor)?;
        tracing::info!("Training complete, artifact at '{}'", artifact.display());
        progress.emit(ProgressEvent::RunComplete { artifact });

        Ok((model, history))
    }

    fn check_cancelled(&self, completed_epochs: usize) -> DigitResult<()> {
        if self.cancel.is_cancelled() {
            tracing::info!("Training cancelled after {} epoch(s)", completed_epochs);
            return Err(DigitError::Cancelled { completed_epochs });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{tests::write_digit_tree, DatasetLoader};
    use crate::data::preprocessor::{Polarity, Preprocessor};
    use crate::ml::InferBackend;
    use crate::ml::model::ModelBuilder;
    use crate::ml::TrainBackend;

    fn partitions(dir: &std::path::Path) -> (DataPartition, DataPartition) {
        let train = dir.join("training");
        let test = dir.join("testing");
        write_digit_tree(&train, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9], 2);
        write_digit_tree(&test, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9], 1);
        DatasetLoader::new(Preprocessor::new(Polarity::Auto), 64)
            .load(&train, &test, 1234)
            .unwrap()
    }

    fn trainer(store: ArtifactStore) -> Trainer<TrainBackend> {
        Trainer::new(NetworkConfig::default(), store, Default::default())
    }

    #[test]
    fn test_single_epoch_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let (train, test) = partitions(tmp.path());
        let store = ArtifactStore::new(tmp.path().join("mnist-model.mpk"));
        let model = ModelBuilder::build::<TrainBackend>(&NetworkConfig::default(), &Default::default());

        let mut events = Vec::new();
        let (_, history) = trainer(store.clone())
            .train(model, &train, &test, 1, &mut |e: ProgressEvent| events.push(e))
            .unwrap();

        assert_eq!(history.len(), 1);
        let results: Vec<String> = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::EpochResult(_)))
            .map(|e| e.to_string())
            .collect();
        assert_eq!(results.len(), 1);

        let accuracy: f64 = results[0]
            .split("Accuracy: ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap()
            .parse()
            .unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        assert!(store.exists());
        assert!(matches!(events.last(), Some(ProgressEvent::RunComplete { .. })));
    }

    #[test]
    fn test_emits_one_result_per_epoch_with_bounded_metrics() {
        let tmp = tempfile::tempdir().unwrap();
        let (train, test) = partitions(tmp.path());
        let store = ArtifactStore::new(tmp.path().join("model.mpk"));
        let model = ModelBuilder::build::<TrainBackend>(&NetworkConfig::default(), &Default::default());

        let mut results = Vec::new();
        let mut starts = 0;
        trainer(store)
            .train(model, &train, &test, 3, &mut |e: ProgressEvent| match e {
                ProgressEvent::EpochResult(m) => results.push(m),
                ProgressEvent::EpochStarted { .. } => starts += 1,
                _ => {}
            })
            .unwrap();

        assert_eq!(starts, 3);
        assert_eq!(results.iter().map(|m| m.epoch).collect::<Vec<_>>(), vec![1, 2, 3]);
        for m in &results {
            for v in [m.accuracy, m.precision, m.recall, m.f1] {
                assert!((0.0..=1.0).contains(&v));
            }
            assert!(m.train_loss.is_finite());
        }
    }

    #[test]
    fn test_cancelled_run_writes_no_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let (train, test) = partitions(tmp.path());
        let store = ArtifactStore::new(tmp.path().join("model.mpk"));
        let model = ModelBuilder::build::<TrainBackend>(&NetworkConfig::default(), &Default::default());

        let token = CancellationToken::new();
        token.cancel();
        let err = trainer(store.clone())
            .with_cancellation(token)
            .train(model, &train, &test, 2, &mut |_: ProgressEvent| {})
            .unwrap_err();

        assert!(matches!(err, DigitError::Cancelled { completed_epochs: 0 }));
        assert!(!store.exists());
    }

    #[test]
    fn test_diverging_loss_is_a_training_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (train, test) = partitions(tmp.path());
        let store = ArtifactStore::new(tmp.path().join("model.mpk"));
        let hyper = crate::domain::network::Hyperparameters {
            learning_rate: 1e30,
            ..Default::default()
        };
        let network = NetworkConfig::lenet(hyper).unwrap();
        let model = ModelBuilder::build::<TrainBackend>(&network, &Default::default());

        let trainer = Trainer::<TrainBackend>::new(network, store.clone(), Default::default());
        let result = trainer.train(model, &train, &test, 5, &mut |_: ProgressEvent| {});

        assert!(matches!(result, Err(DigitError::Training(_))));
        assert!(!store.exists());
    }

    #[test]
    fn test_zero_epochs_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (train, test) = partitions(tmp.path());
        let model = ModelBuilder::build::<TrainBackend>(&NetworkConfig::default(), &Default::default());
        let err = trainer(ArtifactStore::new(tmp.path().join("m.mpk")))
            .train(model, &train, &test, 0, &mut |_: ProgressEvent| {})
            .unwrap_err();
        assert!(matches!(err, DigitError::Configuration(_)));
    }

    #[test]
    fn test_artifact_keeps_the_partition_preprocessor() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("tree");
        write_digit_tree(&dir, &[0, 1, 2, 3], 2);
        let (train, test) = DatasetLoader::new(Preprocessor::new(Polarity::Invert), 64)
            .load_with_holdout(&dir, 0.5, 1)
            .unwrap();
        let store = ArtifactStore::new(tmp.path().join("model.mpk"));
        let model = ModelBuilder::build::<TrainBackend>(&NetworkConfig::default(), &Default::default());

        trainer(store.clone()).train(model, &train, &test, 1, &mut |_: ProgressEvent| {}).unwrap();

        let loaded = store.load::<InferBackend>(&Default::default()).unwrap();
        assert_eq!(loaded.preprocessor.polarity(), Polarity::Invert);
    }

    #[test]
    fn test_mismatched_preprocessors_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("tree");
        write_digit_tree(&dir, &[0, 1], 2);
        let (train, _) = DatasetLoader::new(Preprocessor::new(Polarity::AsIs), 64)
            .load_with_holdout(&dir, 0.5, 1)
            .unwrap();
        let (_, test) = DatasetLoader::new(Preprocessor::new(Polarity::Invert), 64)
            .load_with_holdout(&dir, 0.5, 1)
            .unwrap();
        let store = ArtifactStore::new(tmp.path().join("model.mpk"));
        let model = ModelBuilder::build::<TrainBackend>(&NetworkConfig::default(), &Default::default());

        let err = trainer(store.clone())
            .train(model, &train, &test, 1, &mut |_: ProgressEvent| {})
            .unwrap_err();
        assert!(matches!(err, DigitError::Configuration(_)));
        assert!(!store.exists());
    }
}
