//! Workflow progress notifications

use crate::workflow::WorkflowStage;

/// One stage transition, emitted as it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
    /// Human-readable label of the stage entered
    pub label: &'static str,
}

/// Receives transitions synchronously from the orchestrator. Observers are
/// advisory: they cannot alter or abort the run.
pub trait ProgressObserver: Send + Sync {
    fn on_transition(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_transition(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_transition(&self, _event: &ProgressEvent) {}
}
