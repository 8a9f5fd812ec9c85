// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`   — trains the classifier on a labeled image tree
//   2. `predict` — loads the trained model and classifies images
//
// Progress lines from training go to stdout; diagnostics go
// through tracing to stderr.

pub mod commands;

use std::{io::Write, path::PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

use crate::application::{
    predict_use_case::PredictUseCase, train_use_case::TrainConfig, training_job::TrainingJob,
};
use crate::domain::error::DigitError;
use crate::domain::progress::ProgressEvent;
use crate::infra::metrics::MetricsLogger;

#[derive(Parser, Debug)]
#[command(
    name = "digit-recognizer",
    version,
    about = "Train a convolutional network on labeled digit images, then classify single digits."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args).await,
            Commands::Predict(args) => run_predict(args),
        }
    }
}

/// Handles the `train` subcommand.
/// Runs the job in the background and prints each progress line.
async fn run_train(args: TrainArgs) -> Result<()> {
    let config: TrainConfig = args.into();
    tracing::info!("Starting training on images in: {}", config.train_dir.display());

    let metrics = MetricsLogger::new(&config.metrics_dir)?;
    let mut job = TrainingJob::spawn(config);

    // Ctrl-C stops the run at the next epoch boundary
    let token = job.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current epoch");
            token.cancel();
        }
    });

    while let Some(event) = job.next_event().await {
        println!("{event}");
        if let ProgressEvent::EpochResult(m) = &event {
            if let Err(e) = metrics.log(m) {
                tracing::warn!("Cannot record metrics: {e:#}");
            }
        }
    }

    tracing::debug!("Training job ended in state {:?}", job.state());
    let report = job.join().await?;
    tracing::info!(
        "Model at '{}', metrics for {} epoch(s) in '{}'",
        report.artifact.display(),
        report.metrics.len(),
        metrics.csv_path().display()
    );
    Ok(())
}

/// Handles the `predict` subcommand.
/// Exits non-zero if any image could not be classified.
fn run_predict(args: PredictArgs) -> Result<()> {
    let use_case = PredictUseCase::new(args.artifact);
    let failed = classify_images(&use_case, &args.images, &mut std::io::stdout())?;
    if failed > 0 {
        bail!("{failed} of {} image(s) could not be classified", args.images.len());
    }
    Ok(())
}

/// Writes one line per classified image and returns how many were
/// skipped. A bad image only costs its own line; any other error
/// (no trained model, for one) stops the loop.
fn classify_images(
    use_case: &PredictUseCase,
    images: &[PathBuf],
    out: &mut impl Write,
) -> Result<usize> {
    let mut failed = 0;
    for image in images {
        match use_case.execute(image) {
            Ok(prediction) => writeln!(
                out,
                "{}: {} ({:.1}%)",
                image.display(),
                prediction.digit,
                prediction.confidence * 100.0
            )?,
            Err(e) if e.downcast_ref::<DigitError>().is_some_and(DigitError::is_per_call) => {
                eprintln!("{}: {e:#}", image.display());
                failed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(failed)
}
