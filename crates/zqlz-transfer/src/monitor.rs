//! Cancellation and progress context passed explicitly through a transfer

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{TransferError, TransferResult};

const UNKNOWN_TOTAL: u64 = u64::MAX;

#[derive(Debug)]
struct Progress {
    rows_read: AtomicU64,
    rows_written: AtomicU64,
    total_rows: AtomicU64,
    current_task: Mutex<Option<String>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            rows_read: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            total_rows: AtomicU64::new(UNKNOWN_TOTAL),
            current_task: Mutex::new(None),
        }
    }
}

/// Cancellation signal plus progress counters for one transfer job.
///
/// Cancellation is cooperative: it is observed between segments and before
/// each introspection call, never in the middle of a read.
#[derive(Debug, Clone, Default)]
pub struct TransferMonitor {
    token: CancellationToken,
    progress: Arc<Progress>,
}

impl TransferMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor driven by an externally owned token
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            progress: Arc::default(),
        }
    }

    /// Monitor for a sub-job: cancelled with its parent, but counting its own progress
    pub fn child(&self) -> Self {
        Self::with_token(self.token.child_token())
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn check_cancelled(&self) -> TransferResult<()> {
        if self.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Record the step currently in progress
    pub fn sub_task(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(task = %name, "transfer step");
        *self.progress.current_task.lock() = Some(name);
    }

    pub fn current_task(&self) -> Option<String> {
        self.progress.current_task.lock().clone()
    }

    pub fn add_rows_read(&self, rows: u64) {
        self.progress.rows_read.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_rows_written(&self, rows: u64) {
        self.progress.rows_written.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn set_total_rows(&self, total: Option<u64>) {
        self.progress
            .total_rows
            .store(total.unwrap_or(UNKNOWN_TOTAL), Ordering::Relaxed);
    }

    pub fn rows_read(&self) -> u64 {
        self.progress.rows_read.load(Ordering::Relaxed)
    }

    pub fn rows_written(&self) -> u64 {
        self.progress.rows_written.load(Ordering::Relaxed)
    }

    /// Expected row count, when a row-count probe succeeded
    pub fn total_rows(&self) -> Option<u64> {
        match self.progress.total_rows.load(Ordering::Relaxed) {
            UNKNOWN_TOTAL => None,
            total => Some(total),
        }
    }
}
