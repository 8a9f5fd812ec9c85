// ============================================================
// Layer 4 — Train/Test Splitter
// ============================================================
// Shuffles items with a caller-supplied RNG and splits them into
// two sets. Used when only one labeled directory tree is given
// and the test partition has to be carved out of it.
//
// The RNG is passed in (instead of thread_rng) so that a fixed
// seed always produces the same split.
//
// Split ratio: `train_fraction` of the items go to training,
// rounded to the nearest whole item.

use rand::{seq::SliceRandom, Rng};

/// Shuffle `items` and split into (train, test).
///
/// # Example
/// ```ignore
/// let mut rng = StdRng::seed_from_u64(1234);
/// let (train, test) = split_train_test(files, 0.8, &mut rng);
/// ```
pub fn split_train_test<T, R: Rng + ?Sized>(
    mut items: Vec<T>,
    train_fraction: f64,
    rng: &mut R,
) -> (Vec<T>, Vec<T>) {
    // Fisher-Yates shuffle
    items.shuffle(rng);

    let total = items.len();
    let split_at = ((total as f64) * train_fraction.clamp(0.0, 1.0)).round() as usize;
    let split_at = split_at.min(total);

    // split_off(n) leaves [0..n) in `items` and returns [n..total)
    let test = items.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} test ({}% / {}%)",
        items.len(),
        test.len(),
        (items.len() * 100) / total.max(1),
        (test.len() * 100) / total.max(1),
    );

    (items, test)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1234)
    }

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, test) = split_train_test(items, 0.8, &mut rng());
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (train, test) = split_train_test(items, 0.7, &mut rng());
        let mut all: Vec<usize> = train.into_iter().chain(test).collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_train_test((0..40).collect::<Vec<usize>>(), 0.5, &mut rng());
        let b = split_train_test((0..40).collect::<Vec<usize>>(), 0.5, &mut rng());
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let (train, test) = split_train_test(Vec::<usize>::new(), 0.8, &mut rng());
        assert!(train.is_empty());
        assert!(test.is_empty());
    }

    #[test]
    fn test_full_training_split() {
        let items: Vec<usize> = (0..10).collect();
        let (train, test) = split_train_test(items, 1.0, &mut rng());
        assert_eq!(train.len(), 10);
        assert!(test.is_empty());
    }
}
