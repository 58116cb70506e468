use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use chrono::{Local, NaiveDateTime};
use log::{debug, error, info, warn};

use crate::data_capture::types::CycleRecord;
use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{CommitOutcome, RetryPolicy, WriteMode};

/// Placeholder used in file names when a cycle reported no part number.
pub const UNKNOWN_PART: &str = "unknown_part";

/// Timestamp format embedded in file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// Upper bound on `_1`, `_2`, ... suffixes tried when a timestamped name is taken.
const MAX_NAME_SUFFIX: u32 = 1000;

/// CSV log writer.
///
/// All files live directly under `base_path`, which is created on demand.
/// Appends to the same destination file are serialised through an in-process
/// lock table, so sessions sharing one machine identity never interleave rows.
/// An entry lives only while some writer holds or waits on it.
pub struct FileStorage {
    base_path: PathBuf,
    retry: RetryPolicy,
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base_path = base_path.as_ref().to_path_buf();
        info!("FileStorage initialized at {}", base_path.display());
        Self {
            base_path,
            retry: RetryPolicy::default(),
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn ensure_base_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path).map_err(|e| {
            error!("Failed to create log dir {}: {}", self.base_path.display(), e);
            StorageError::DirectoryFailed(self.base_path.clone(), e)
        })
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = lock_ignoring_poison(&self.file_locks);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Drops the table entry for `path` once no other writer holds or waits on it.
    ///
    /// Must be called after the guard on `lock` has been released.
    fn release_lock(&self, path: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = lock_ignoring_poison(&self.file_locks);
        // one reference in the table, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        lock_ignoring_poison(&self.file_locks).len()
    }

    /// Writes `bytes` to a fresh `<stem><suffix>.csv`, never overwriting.
    ///
    /// A taken name gets a numeric suffix: `<stem>_1<suffix>.csv`, `<stem>_2<suffix>.csv`, ...
    fn create_unique(&self, stem: &str, suffix: &str, bytes: &[u8]) -> Result<PathBuf, (PathBuf, io::Error)> {
        let mut n = 0;
        loop {
            let name = if n == 0 {
                format!("{stem}{suffix}.csv")
            } else {
                format!("{stem}_{n}{suffix}.csv")
            };
            let path = self.base_path.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    return match file.write_all(bytes).and_then(|_| file.sync_data()) {
                        Ok(()) => Ok(path),
                        Err(e) => Err((path, e)),
                    };
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && n < MAX_NAME_SUFFIX => {
                    debug!("{} already exists, trying next suffix", path.display());
                    n += 1;
                }
                Err(e) => return Err((path, e)),
            }
        }
    }

    // create_new never reuses a name, so no lock is taken here
    fn commit_new_file(&self, record: &CycleRecord) -> Result<CommitOutcome, StorageError> {
        let bytes = encode(record, true)?;
        let stem = timestamped_stem(record, record.timestamp);

        match self.create_unique(&stem, "", &bytes) {
            Ok(path) => {
                info!("[{}] Data saved to: {}", record.machine, path.display());
                Ok(CommitOutcome::Created(path))
            }
            Err((path, e)) => {
                error!("[{}] ERROR: Could not write to {}: {}", record.machine, path.display(), e);
                Err(StorageError::WriteFailed(path, e))
            }
        }
    }

    fn commit_append(&self, record: &CycleRecord) -> Result<CommitOutcome, StorageError> {
        let with_header = encode(record, true)?;
        let row_only = encode(record, false)?;
        let path = self.base_path.join(append_file_name(record));

        let lock = self.lock_for(&path);
        let outcome = {
            let _guard = lock_ignoring_poison(&lock);
            self.append_or_backup(record, &path, &with_header, &row_only)
        };
        self.release_lock(&path, lock);
        outcome
    }

    /// Retry loop of one append; the caller holds the lock for `path`.
    fn append_or_backup(
        &self,
        record: &CycleRecord,
        path: &Path,
        with_header: &[u8],
        row_only: &[u8],
    ) -> Result<CommitOutcome, StorageError> {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match append_row(path, with_header, row_only) {
                Ok(()) => {
                    info!("[{}] Data appended to: {}", record.machine, path.display());
                    return Ok(CommitOutcome::Appended(path.to_path_buf()));
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "[{}] Warning: {} locked or inaccessible ({}), retrying in {:?}... (Attempt {}/{})",
                        record.machine,
                        path.display(),
                        e,
                        self.retry.delay,
                        attempt,
                        attempts
                    );
                    thread::sleep(self.retry.delay);
                }
                Err(e) => {
                    error!(
                        "[{}] ERROR: Could not write to {} after {} attempts: {}",
                        record.machine,
                        path.display(),
                        attempts,
                        e
                    );
                }
            }
        }

        let stem = timestamped_stem(record, Local::now().naive_local());
        match self.create_unique(&stem, "_BACKUP", with_header) {
            Ok(backup) => {
                warn!("[{}] Data saved to backup file: {}", record.machine, backup.display());
                Ok(CommitOutcome::Backup {
                    intended: path.to_path_buf(),
                    backup,
                })
            }
            Err((backup, e)) => {
                error!(
                    "[{}] ERROR: Could not write backup file {}: {}",
                    record.machine,
                    backup.display(),
                    e
                );
                Err(StorageError::BackupFailed(backup, e))
            }
        }
    }
}

impl Storage for FileStorage {
    fn commit(&self, record: &CycleRecord, mode: WriteMode) -> Result<CommitOutcome, StorageError> {
        self.ensure_base_dir()?;
        match mode {
            WriteMode::NewFile => self.commit_new_file(record),
            WriteMode::Append => self.commit_append(record),
        }
    }
}

/// `<identity>_<part>.csv`, shared by every cycle of one part.
pub fn append_file_name(record: &CycleRecord) -> String {
    format!(
        "{}_{}.csv",
        sanitize(&record.machine),
        sanitize(record.part().unwrap_or(UNKNOWN_PART))
    )
}

fn timestamped_stem(record: &CycleRecord, at: NaiveDateTime) -> String {
    format!(
        "{}_{}_{}",
        sanitize(&record.machine),
        sanitize(record.part().unwrap_or(UNKNOWN_PART)),
        at.format(FILE_TIMESTAMP_FORMAT)
    )
}

/// Makes a label safe to embed in a file name.
///
/// Path separators, reserved characters, whitespace, control characters and
/// `%` itself are percent-encoded byte by byte, so distinct labels stay
/// distinct: `Mill 1` becomes `Mill%201` and never meets `Mill_1`.
pub fn sanitize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' => push_escaped(&mut out, c),
            c if c.is_control() || c.is_whitespace() => push_escaped(&mut out, c),
            c => out.push(c),
        }
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    let mut utf8 = [0u8; 4];
    for byte in c.encode_utf8(&mut utf8).bytes() {
        out.push_str(&format!("%{byte:02X}"));
    }
}

fn encode(record: &CycleRecord, header: bool) -> Result<Vec<u8>, StorageError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(header)
        .from_writer(Vec::new());
    writer.serialize(record)?;
    writer
        .into_inner()
        .map_err(|e| StorageError::EncodeFailed(e.to_string()))
}

/// One append attempt. The header goes in only when the file is still empty.
fn append_row(path: &Path, with_header: &[u8], row_only: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    append_once(&mut file, with_header, row_only)
}

/// File operations an append attempt relies on.
trait AppendTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Writes header+row or row, and cuts the file back to its previous length on failure.
///
/// A partially written attempt never stays behind, so the next attempt sees
/// the file exactly as this one found it.
fn append_once<F: AppendTarget>(file: &mut F, with_header: &[u8], row_only: &[u8]) -> io::Result<()> {
    let prev_len = file.current_len()?;
    let bytes = if prev_len == 0 { with_header } else { row_only };
    if let Err(e) = file.write_all(bytes).and_then(|_| file.sync()) {
        if let Err(rollback) = file.truncate_to(prev_len) {
            error!("Could not roll back a partial write: {}", rollback);
        }
        return Err(e);
    }
    Ok(())
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
