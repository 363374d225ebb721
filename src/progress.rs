use crate::model::{ExecutionPhase, ExecutionProgress};

/// Trait for reporting execution progress.
///
/// The CLI implements this with tracing/indicatif; library callers that do
/// not care pass [`SilentReporter`]. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_phase_start(&self, _phase: ExecutionPhase) {}
    fn on_phase_complete(&self, _phase: ExecutionPhase, _duration_secs: f64) {}
    fn on_progress(&self, _progress: &ExecutionProgress) {}
    fn on_warning(&self, _message: &str) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
