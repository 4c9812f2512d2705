//! Results and callbacks of long-running operations.
//!
//! Loading, searching and exporting report through an [`Observer`]. Every
//! callback defaults to a no-op, and may be invoked from worker threads.

use crate::loader::Snapshot;
use std::fmt;
use std::time::Duration;

/// Outcome of a load or export
#[derive(Default)]
pub struct OperationResult {
    pub elapsed: Duration,
    /// Stopped on request; not an error
    pub cancelled: bool,
    pub error: Option<anyhow::Error>,
}

impl OperationResult {
    pub fn completed(elapsed: Duration) -> Self {
        Self {
            elapsed,
            ..Self::default()
        }
    }

    pub fn cancelled(elapsed: Duration) -> Self {
        Self {
            elapsed,
            cancelled: true,
            error: None,
        }
    }

    pub fn failed(elapsed: Duration, error: anyhow::Error) -> Self {
        Self {
            elapsed,
            cancelled: false,
            error: Some(error),
        }
    }

    /// Neither cancelled nor failed
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.error.is_none()
    }
}

impl fmt::Debug for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationResult")
            .field("elapsed", &self.elapsed)
            .field("cancelled", &self.cancelled)
            .field("error", &self.error.as_ref().map(|e| format!("{:#}", e)))
            .finish()
    }
}

/// Outcome of a search
#[derive(Debug, Default)]
pub struct SearchResult {
    pub match_count: usize,
    /// Lowest matching partial line
    pub first_match: Option<usize>,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub error: Option<anyhow::Error>,
}

impl SearchResult {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.error.is_none()
    }
}

/// Receiver of progress and completion events
pub trait Observer: Send + Sync {
    /// Progress of the running operation, 0 to 100
    fn on_progress(&self, _percent: u8) {}

    /// Point-in-time view of a load in progress
    fn on_snapshot(&self, _snapshot: Snapshot) {}

    fn on_load_complete(&self, _result: &OperationResult) {}

    /// First matching partial line, reported as soon as it is known
    fn on_first_match(&self, _partial: usize) {}

    fn on_search_complete(&self, _result: &SearchResult) {}

    fn on_export_complete(&self, _result: &OperationResult) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}
