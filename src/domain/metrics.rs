// ============================================================
// Layer 3 — Evaluation Metrics
// ============================================================
// ConfusionMatrix accumulates (actual, predicted) pairs over a
// full pass of the test partition. EpochMetrics is the summary
// emitted once per epoch.
//
// Averaging: precision, recall and F1 are computed per class and
// macro-averaged over every class that appears either as a label
// or as a prediction. A class that was never predicted has
// precision 0; a class that never occurs has recall 0.

use serde::{Deserialize, Serialize};

use crate::domain::sample::NUM_CLASSES;

/// Counts indexed as `counts[actual][predicted]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: [[u64; NUM_CLASSES]; NUM_CLASSES],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Out-of-range classes are ignored.
    pub fn record(&mut self, actual: usize, predicted: usize) {
        if actual < NUM_CLASSES && predicted < NUM_CLASSES {
            self.counts[actual][predicted] += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> u64 {
        (0..NUM_CLASSES).map(|c| self.counts[c][c]).sum()
    }

    pub fn count(&self, actual: usize, predicted: usize) -> u64 {
        self.counts[actual][predicted]
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    fn true_positives(&self, class: usize) -> u64 {
        self.counts[class][class]
    }

    fn predicted(&self, class: usize) -> u64 {
        (0..NUM_CLASSES).map(|a| self.counts[a][class]).sum()
    }

    fn actual(&self, class: usize) -> u64 {
        self.counts[class].iter().sum()
    }

    fn present_classes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..NUM_CLASSES).filter(|&c| self.predicted(c) > 0 || self.actual(c) > 0)
    }

    pub fn class_precision(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.predicted(class))
    }

    pub fn class_recall(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.actual(class))
    }

    pub fn class_f1(&self, class: usize) -> f64 {
        let p = self.class_precision(class);
        let r = self.class_recall(class);
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    pub fn macro_precision(&self) -> f64 {
        self.macro_average(Self::class_precision)
    }

    pub fn macro_recall(&self) -> f64 {
        self.macro_average(Self::class_recall)
    }

    pub fn macro_f1(&self) -> f64 {
        self.macro_average(Self::class_f1)
    }

    fn macro_average(&self, per_class: fn(&Self, usize) -> f64) -> f64 {
        let (sum, n) = self
            .present_classes()
            .fold((0.0, 0usize), |(s, n), c| (s + per_class(self, c), n + 1));
        if n == 0 { 0.0 } else { sum / n as f64 }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Summary of one training epoch, evaluated on the test partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch number, starting at 1
    pub epoch: usize,

    /// Mean cross-entropy over the epoch's training batches
    pub train_loss: f64,

    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl EpochMetrics {
    pub fn from_confusion(epoch: usize, train_loss: f64, matrix: &ConfusionMatrix) -> Self {
        Self {
            epoch,
            train_loss,
            accuracy: matrix.accuracy(),
            precision: matrix.macro_precision(),
            recall: matrix.macro_recall(),
            f1: matrix.macro_f1(),
        }
    }

    /// Returns true if this epoch beats the best accuracy so far
    pub fn is_improvement(&self, best_accuracy: f64) -> bool {
        self.accuracy > best_accuracy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matrix_is_all_zero() {
        let m = EpochMetrics::from_confusion(1, 0.0, &ConfusionMatrix::new());
        assert_eq!((m.accuracy, m.precision, m.recall, m.f1), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_perfect_predictions() {
        let mut cm = ConfusionMatrix::new();
        for c in 0..NUM_CLASSES {
            cm.record(c, c);
        }
        assert_eq!(cm.accuracy(), 1.0);
        assert_eq!(cm.macro_precision(), 1.0);
        assert_eq!(cm.macro_recall(), 1.0);
        assert_eq!(cm.macro_f1(), 1.0);
    }

    #[test]
    fn test_macro_average_over_present_classes() {
        let mut cm = ConfusionMatrix::new();
        // class 0: two samples, one confused as class 1
        cm.record(0, 0);
        cm.record(0, 1);
        // class 1: one sample, correct
        cm.record(1, 1);

        assert!((cm.accuracy() - 2.0 / 3.0).abs() < 1e-12);
        // precision: class0 = 1/1, class1 = 1/2
        assert!((cm.macro_precision() - 0.75).abs() < 1e-12);
        // recall: class0 = 1/2, class1 = 1/1
        assert!((cm.macro_recall() - 0.75).abs() < 1e-12);
        // f1 per class: 2/3 each
        assert!((cm.macro_f1() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_never_predicted_class_has_zero_precision() {
        let mut cm = ConfusionMatrix::new();
        cm.record(3, 5);
        assert_eq!(cm.class_precision(3), 0.0);
        assert_eq!(cm.class_recall(5), 0.0);
        assert_eq!(cm.macro_f1(), 0.0);
    }

    #[test]
    fn test_ignores_out_of_range() {
        let mut cm = ConfusionMatrix::new();
        cm.record(10, 0);
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn test_is_improvement() {
        let mut cm = ConfusionMatrix::new();
        cm.record(2, 2);
        cm.record(2, 4);
        let m = EpochMetrics::from_confusion(2, 0.7, &cm);
        assert!(m.is_improvement(0.3));
        assert!(!m.is_improvement(0.5));
    }
}
