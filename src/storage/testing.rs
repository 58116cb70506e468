//! In-memory [`Storage`] used by unit tests of the session and network layers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::data_capture::types::CycleRecord;
use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{CommitOutcome, WriteMode};

#[derive(Default)]
pub struct MemStorage {
    records: Mutex<Vec<(CycleRecord, WriteMode)>>,
    failures_left: AtomicUsize,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` commits fail with a write error.
    pub fn failing_first(n: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(n),
        }
    }

    pub fn records(&self) -> Vec<CycleRecord> {
        self.records.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn modes(&self) -> Vec<WriteMode> {
        self.records.lock().unwrap().iter().map(|(_, m)| *m).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl Storage for MemStorage {
    fn commit(&self, record: &CycleRecord, mode: WriteMode) -> Result<CommitOutcome, StorageError> {
        let path = PathBuf::from(format!("mem/{}.csv", record.machine));
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::WriteFailed(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "simulated"),
            ));
        }
        self.records.lock().unwrap().push((record.clone(), mode));
        Ok(CommitOutcome::Created(path))
    }
}
