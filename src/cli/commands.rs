// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `predict`
// and all their configurable flags.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::TrainConfig;
use crate::data::preprocessor::Polarity;
use crate::domain::network::WeightInit;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the digit classifier on a labeled image tree
    Train(TrainArgs),

    /// Classify one or more images with a trained model
    Predict(PredictArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Training tree: one subdirectory per digit ("0".."9")
    #[arg(long, env = "DIGIT_TRAIN_DIR", default_value = "data/mnist_png/training")]
    pub train_dir: PathBuf,

    /// Test tree with the same layout as the training tree
    #[arg(long, env = "DIGIT_TEST_DIR", default_value = "data/mnist_png/testing")]
    pub test_dir: PathBuf,

    /// Hold out this fraction of the training tree for testing
    /// instead of reading a separate test tree
    #[arg(long, conflicts_with = "test_dir")]
    pub holdout: Option<f64>,

    /// Where to write the trained model
    #[arg(long, env = "DIGIT_ARTIFACT", default_value = "mnist-model.mpk")]
    pub artifact: PathBuf,

    /// Directory for metrics.csv
    #[arg(long, default_value = "runs")]
    pub metrics_dir: PathBuf,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Number of samples per optimiser step
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Seed for the file shuffle and the initial weights
    #[arg(long, default_value_t = 1234)]
    pub seed: u64,

    #[arg(long, default_value_t = 0.006)]
    pub lr: f64,

    /// Nesterov momentum coefficient
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    #[arg(long, value_enum, default_value_t = InitArg::Xavier)]
    pub init: InitArg,

    /// How to reconcile stroke/background brightness
    #[arg(long, value_enum, default_value_t = PolarityArg::Auto)]
    pub polarity: PolarityArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolarityArg {
    /// Keep intensities as decoded
    AsIs,
    /// Always invert (for dark strokes on a light background)
    Invert,
    /// Invert images whose border is light
    Auto,
}

impl From<PolarityArg> for Polarity {
    fn from(p: PolarityArg) -> Self {
        match p {
            PolarityArg::AsIs => Polarity::AsIs,
            PolarityArg::Invert => Polarity::Invert,
            PolarityArg::Auto => Polarity::Auto,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitArg {
    Xavier,
    XavierNormal,
    Kaiming,
}

impl From<InitArg> for WeightInit {
    fn from(i: InitArg) -> Self {
        match i {
            InitArg::Xavier => WeightInit::XavierUniform,
            InitArg::XavierNormal => WeightInit::XavierNormal,
            InitArg::Kaiming => WeightInit::KaimingUniform,
        }
    }
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let defaults = TrainConfig::default();
        TrainConfig {
            train_dir: a.train_dir,
            test_dir: if a.holdout.is_some() { None } else { Some(a.test_dir) },
            holdout_fraction: a.holdout.unwrap_or(defaults.holdout_fraction),
            artifact_path: a.artifact,
            metrics_dir: a.metrics_dir,
            epochs: a.epochs,
            batch_size: a.batch_size,
            seed: a.seed,
            learning_rate: a.lr,
            momentum: a.momentum,
            weight_init: a.init.into(),
            polarity: a.polarity.into(),
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image files to classify
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Trained model written by `train`
    #[arg(long, env = "DIGIT_ARTIFACT", default_value = "mnist-model.mpk")]
    pub artifact: PathBuf,
}
