// ============================================================
// Layer 2 — TrainingJob
// ============================================================
// Runs a TrainUseCase off the async runtime's worker threads and
// exposes it as:
//
//   next_event()         — the ordered progress stream (ends when the run ends)
//   state()              — Idle → Running → Completed | Failed
//   cancellation_token() — early stop, honoured at the next epoch boundary
//   join()               — the run's result
//
// The blocking training work goes to tokio's blocking pool
// (spawn_blocking); events travel over an unbounded mpsc channel
// since volume is a handful per epoch.

use anyhow::{Context, Result};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::application::train_use_case::{TrainConfig, TrainReport, TrainUseCase};
use crate::domain::progress::ProgressEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
}

pub struct TrainingJob {
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    state: watch::Receiver<JobState>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<TrainReport>>,
}

impl TrainingJob {
    /// Start training in the background. Must be called from within
    /// a tokio runtime.
    pub fn spawn(config: TrainConfig) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(JobState::Idle);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::task::spawn_blocking(move || {
            state_tx.send_replace(JobState::Running);

            let mut sink = |event: ProgressEvent| {
                // A dropped receiver only means nobody is listening.
                let _ = tx.send(event);
            };
            let result = TrainUseCase::new(config).execute(&mut sink, &token);

            state_tx.send_replace(if result.is_ok() { JobState::Completed } else { JobState::Failed });
            result
        });

        Self { events, state, cancel, handle }
    }

    /// Next progress event, or `None` once the run has finished and
    /// every event has been delivered.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// A token that stops this job at the next epoch boundary
    /// when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> Result<TrainReport> {
        self.handle.await.context("Training task panicked")?
    }
}
