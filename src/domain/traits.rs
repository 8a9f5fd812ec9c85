// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// ProgressSink is the one-way notification channel the Trainer
// reports through. It has no return value and no backpressure:
// volume is a handful of events per epoch.
//
// Any FnMut(ProgressEvent) closure is a sink; the async job
// wraps a tokio channel sender in one. A sink whose receiver has
// gone away drops events silently.

use crate::domain::progress::ProgressEvent;

pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent),
{
    fn emit(&mut self, event: ProgressEvent) {
        self(event)
    }
}
