// ============================================================
// Layer 4 — Labeled Image Loader
// ============================================================
// Walks a labeled directory tree into shuffled, preprocessed
// data partitions.
//
// Expected layout:
//
//   root/
//     0/  a.png  b.png ...
//     1/  ...
//     ...
//     9/  ...
//
// Each immediate subdirectory named "0".."9" is a label; every
// supported image beneath it (at any depth) is a sample with that
// label. Other subdirectories are skipped with a warning.
//
// Ordering: files are first sorted by path, then shuffled with an
// RNG seeded from the caller's seed. The same seed over the same
// tree always yields the same sample order.

use std::{
    fs,
    path::{Path, PathBuf},
};

use globwalk::DirEntry;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::dataset::DataPartition;
use crate::data::preprocessor::Preprocessor;
use crate::data::splitter::split_train_test;
use crate::domain::error::{DigitError, DigitResult};
use crate::domain::sample::{LabeledSample, NUM_CLASSES};

pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// One image file on disk and the label taken from its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledFile {
    pub path: PathBuf,
    pub label: u8,
}

pub struct DatasetLoader {
    preprocessor: Preprocessor,
    batch_size: usize,
}

impl DatasetLoader {
    pub fn new(preprocessor: Preprocessor, batch_size: usize) -> Self {
        Self { preprocessor, batch_size }
    }

    /// Load separate training and test trees.
    pub fn load(
        &self,
        training_root: &Path,
        test_root: &Path,
        seed: u64,
    ) -> DigitResult<(DataPartition, DataPartition)> {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut train_files = scan_labeled_tree(training_root)?;
        train_files.shuffle(&mut rng);
        let mut test_files = scan_labeled_tree(test_root)?;
        test_files.shuffle(&mut rng);

        tracing::info!(
            "Found {} training and {} test images",
            train_files.len(),
            test_files.len()
        );
        Ok((self.read_partition(&train_files)?, self.read_partition(&test_files)?))
    }

    /// Load one tree and carve a test partition of `test_fraction`
    /// out of it.
    pub fn load_with_holdout(
        &self,
        root: &Path,
        test_fraction: f64,
        seed: u64,
    ) -> DigitResult<(DataPartition, DataPartition)> {
        if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
            return Err(DigitError::Configuration(format!(
                "hold-out fraction must be in (0, 1), got {test_fraction}"
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let files = scan_labeled_tree(root)?;
        let (train_files, test_files) = split_train_test(files, 1.0 - test_fraction, &mut rng);

        if train_files.is_empty() || test_files.is_empty() {
            return Err(DigitError::Dataset(format!(
                "'{}' has too few images for a {:.0}% hold-out split",
                root.display(),
                test_fraction * 100.0
            )));
        }
        Ok((self.read_partition(&train_files)?, self.read_partition(&test_files)?))
    }

    fn read_partition(&self, files: &[LabeledFile]) -> DigitResult<DataPartition> {
        let samples = files
            .iter()
            .map(|f| {
                let image = self.preprocessor.normalize_path(&f.path).map_err(|e| {
                    DigitError::Dataset(format!("'{}': {e}", f.path.display()))
                })?;
                LabeledSample::new(image, f.label)
            })
            .collect::<DigitResult<Vec<_>>>()?;

        tracing::debug!("Preprocessed {} samples", samples.len());
        DataPartition::new(samples, self.batch_size, self.preprocessor)
    }
}

/// Enumerate every image under the label directories of `root`,
/// sorted by path.
pub fn scan_labeled_tree(root: &Path) -> DigitResult<Vec<LabeledFile>> {
    if !root.is_dir() {
        return Err(DigitError::Dataset(format!(
            "dataset directory '{}' does not exist",
            root.display()
        )));
    }

    let entries = fs::read_dir(root)
        .map_err(|e| DigitError::Dataset(format!("cannot read '{}': {e}", root.display())))?;

    let mut label_dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DigitError::Dataset(e.to_string()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match parse_label(&entry.file_name().to_string_lossy()) {
            Some(label) => label_dirs.push((label, path)),
            None => tracing::warn!("Skipping '{}': not a digit label directory", path.display()),
        }
    }
    if label_dirs.is_empty() {
        return Err(DigitError::Dataset(format!(
            "'{}' contains no labeled subdirectories (expected 0..9)",
            root.display()
        )));
    }
    label_dirs.sort();

    let mut files = Vec::new();
    for (label, dir) in &label_dirs {
        for path in image_files(dir)? {
            files.push(LabeledFile { path, label: *label });
        }
    }
    if files.is_empty() {
        return Err(DigitError::Dataset(format!(
            "'{}' contains no images",
            root.display()
        )));
    }
    Ok(files)
}

fn parse_label(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let digit = chars.next()?.to_digit(10)?;
    (chars.next().is_none() && (digit as usize) < NUM_CLASSES).then_some(digit as u8)
}

fn image_files(dir: &Path) -> DigitResult<Vec<PathBuf>> {
    let pattern = format!("*.{{{}}}", SUPPORTED_EXTENSIONS.join(","));
    let walker = globwalk::GlobWalkerBuilder::from_patterns(dir, &[pattern])
        .follow_links(true)
        .case_insensitive(true)
        .sort_by(|a: &DirEntry, b: &DirEntry| a.path().cmp(b.path()))
        .build()
        .map_err(|e| DigitError::Dataset(format!("cannot walk '{}': {e}", dir.display())))?;

    walker
        .map(|entry| {
            entry
                .map(|e| e.into_path())
                .map_err(|e| DigitError::Dataset(format!("cannot walk '{}': {e}", dir.display())))
        })
        .filter(|p| p.as_ref().map_or(true, |p| p.is_file()))
        .collect()
}
