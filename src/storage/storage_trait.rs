//! Storage Trait
//!
//! This module defines the `Storage` trait, the seam between session handling
//! and durable persistence of completed cycles.
//!
//! Implementations are blocking: callers on the async runtime hand commits to
//! `tokio::task::spawn_blocking`, which also hosts any retry pauses.

use crate::data_capture::types::CycleRecord;
use crate::error_handling::types::StorageError;
use crate::storage::types::{CommitOutcome, WriteMode};

/// Persists completed cycle records.
///
/// Every record of a run must be written with the same column order so that
/// append-mode files stay valid tables.
pub trait Storage: Send + Sync {
    /// Commits one record and reports the file that now holds it.
    ///
    /// - `record` - The completed cycle.
    /// - `mode` - New file per cycle, or append to the per-part file.
    fn commit(&self, record: &CycleRecord, mode: WriteMode) -> Result<CommitOutcome, StorageError>;
}
