use std::sync::Arc;

use burn::data::dataset::Dataset;

use crate::data::preprocessor::Preprocessor;
use crate::domain::error::{DigitError, DigitResult};
use crate::domain::sample::{LabeledSample, NUM_CLASSES};

/// An ordered, restartable sequence of mini-batches.
///
/// Samples are shared behind an `Arc`, so cloning a partition (for
/// example to hand it to a burn `DataLoader`) never copies pixels.
/// Each pass over a `DataLoader` built on it starts again from the
/// first sample; the last batch may be short.
///
/// A partition remembers the Preprocessor its samples went through,
/// so whatever is trained on it can persist that exact rule.
#[derive(Debug, Clone)]
pub struct DataPartition {
    samples: Arc<Vec<LabeledSample>>,
    batch_size: usize,
    preprocessor: Preprocessor,
}

impl DataPartition {
    pub fn new(
        samples: Vec<LabeledSample>,
        batch_size: usize,
        preprocessor: Preprocessor,
    ) -> DigitResult<Self> {
        if batch_size == 0 {
            return Err(DigitError::Configuration("batch size must be at least 1".into()));
        }
        Ok(Self { samples: Arc::new(samples), batch_size, preprocessor })
    }

    pub fn preprocessor(&self) -> Preprocessor {
        self.preprocessor
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    #[cfg(test)]
    pub fn batches(&self) -> std::slice::Chunks<'_, LabeledSample> {
        self.samples.chunks(self.batch_size)
    }

    /// Number of samples per digit class.
    pub fn label_counts(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0; NUM_CLASSES];
        for s in self.samples.iter() {
            counts[s.label() as usize] += 1;
        }
        counts
    }
}

impl Dataset<LabeledSample> for DataPartition {
    fn get(&self, index: usize) -> Option<LabeledSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::DigitTensor;

    fn partition(n: usize, batch_size: usize) -> DataPartition {
        let samples = (0..n)
            .map(|i| LabeledSample::new(DigitTensor::filled(0.0), (i % 10) as u8).unwrap())
            .collect();
        DataPartition::new(samples, batch_size, Preprocessor::default()).unwrap()
    }

    #[test]
    fn test_last_batch_may_be_short() {
        let p = partition(130, 64);
        let sizes: Vec<usize> = p.batches().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![64, 64, 2]);
        assert_eq!(p.num_batches(), 3);
    }

    #[test]
    fn test_batches_restart_from_the_beginning() {
        let p = partition(20, 8);
        let first: Vec<u8> = p.batches().flatten().map(|s| s.label()).collect();
        let second: Vec<u8> = p.batches().flatten().map(|s| s.label()).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        assert!(matches!(
            DataPartition::new(Vec::new(), 0, Preprocessor::default()),
            Err(DigitError::Configuration(_))
        ));
    }

    #[test]
    fn test_dataset_view_and_label_counts() {
        let p = partition(25, 4);
        assert_eq!(Dataset::len(&p), 25);
        assert_eq!(p.get(13).map(|s| s.label()), Some(3));
        assert!(p.get(25).is_none());
        assert_eq!(p.label_counts()[0], 3);
        assert_eq!(p.label_counts()[9], 2);
    }
}
