use std::path::{Path, PathBuf};
use std::time::Duration;

/// How completed cycles are grouped into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// One file per cycle, named with the capture timestamp.
    NewFile,
    /// One growing file per machine and part number.
    Append,
}

impl WriteMode {
    pub fn from_append_flag(append: bool) -> Self {
        if append {
            WriteMode::Append
        } else {
            WriteMode::NewFile
        }
    }
}

/// Bounded retry applied to append-mode writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Where a committed record ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Created(PathBuf),
    Appended(PathBuf),
    /// The append target stayed unwritable; the record went to a one-off backup file.
    Backup { intended: PathBuf, backup: PathBuf },
}

impl CommitOutcome {
    /// Path of the file that now holds the record.
    pub fn path(&self) -> &Path {
        match self {
            CommitOutcome::Created(p) | CommitOutcome::Appended(p) => p,
            CommitOutcome::Backup { backup, .. } => backup,
        }
    }

    pub fn is_backup(&self) -> bool {
        matches!(self, CommitOutcome::Backup { .. })
    }
}
