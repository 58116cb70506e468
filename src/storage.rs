//! Storage subsystem
//!
//! This module persists completed cycle records as comma-separated log files.
//!
//! Components:
//! - `storage_trait`: the Storage trait used by session handling.
//! - `types`: write modes, retry policy and commit outcomes.
//! - `file_storage`: the CSV log writer with retry-then-backup semantics.

pub mod file_storage;
pub mod storage_trait;
pub mod types;

pub use file_storage::FileStorage;
pub use storage_trait::Storage;
pub use types::{CommitOutcome, RetryPolicy, WriteMode};

#[cfg(test)]
pub(crate) mod testing;
