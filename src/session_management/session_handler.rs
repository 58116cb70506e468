//! Per-connection handling loop.
//!
//! A [`SessionHandler`] reads one socket until the peer closes it, the read
//! fails, or the stop signal fires. Every chunk goes through the session's
//! [`CycleBuffer`](crate::data_capture::CycleBuffer); each completed cycle is
//! run through the field extractor and committed through the injected
//! [`Storage`] before the next one is looked for.
//!
//! ```text
//! AwaitingData ──read──▶ Buffering ──end of cycle──▶ Committing ──▶ AwaitingData / Buffering
//!       │                    │                                            │
//!       └──── EOF / read error / stop ──────────────────────────────────▶ Closed
//! ```
//!
//! The handler never reconnects. Restarting a dialed connection is the
//! dialer's job.

use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::data_capture::field_extractor;
use crate::data_capture::types::CycleRecord;
use crate::error_handling::types::SessionError;
use crate::session_management::session::Session;
use crate::session_management::SessionStatus;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{CommitOutcome, WriteMode};

pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

// Bytes of each chunk echoed at TRACE level.
const PREVIEW_LEN: usize = 64;

/// Turns a telemetry stream into committed cycle records.
///
/// Shared by both connection managers; holds no per-session state.
pub struct SessionHandler {
    storage: Arc<dyn Storage>,
    write_mode: WriteMode,
    read_buffer_size: usize,
}

impl SessionHandler {
    pub fn new(storage: Arc<dyn Storage>, write_mode: WriteMode) -> Self {
        Self {
            storage,
            write_mode,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Runs `session` over `stream` until it closes and returns the closed session.
    ///
    /// A cancelled read ends the session at once; an unfinished cycle in the
    /// buffer is discarded.
    pub async fn run<S>(&self, mut stream: S, mut session: Session, cancel: CancellationToken) -> Session
    where
        S: AsyncRead + Unpin,
    {
        info!(
            "[{}] Connected to {} ({})",
            session.machine, session.remote_addr, session.role
        );
        let mut buf = vec![0u8; self.read_buffer_size];

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[{}] Stop requested, leaving {}", session.machine, session.remote_addr);
                    break;
                }
                read = stream.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    info!("[{}] Connection closed by remote host", session.machine);
                    break;
                }
                Ok(n) => self.on_chunk(&mut session, &buf[..n]).await,
                Err(e) => {
                    let e = SessionError::ReadFailed(e);
                    error!(
                        "[{}] Error processing data from {}: {}",
                        session.machine, session.remote_addr, e
                    );
                    break;
                }
            }
        }

        if session.buffer.holds_telemetry() {
            warn!(
                "[{}] Discarding {} byte(s) of an unfinished cycle (part {})",
                session.machine,
                session.buffer.len(),
                session.buffer.tag().unwrap_or("unknown")
            );
        } else if !session.buffer.is_empty() {
            debug!(
                "[{}] Dropping {} byte(s) of program text",
                session.machine,
                session.buffer.len()
            );
        }
        session.close();
        info!(
            "[{}] Connection closed ({} byte(s) received, {} cycle(s) committed)",
            session.machine, session.bytes_received, session.cycles_committed
        );
        session
    }

    async fn on_chunk(&self, session: &mut Session, chunk: &[u8]) {
        session.bytes_received += chunk.len() as u64;
        debug!("[{}] received {} byte(s)", session.machine, chunk.len());
        trace!(
            "[{}] chunk: {}{}",
            session.machine,
            String::from_utf8_lossy(&chunk[..chunk.len().min(PREVIEW_LEN)]),
            if chunk.len() > PREVIEW_LEN { " ..." } else { "" }
        );

        session.buffer.push(chunk);
        session.status = SessionStatus::Buffering;
        note_part_number(session);

        while let Some(cycle) = session.buffer.take_cycle() {
            info!("[{}] End of cycle detected!", session.machine);
            session.status = SessionStatus::Committing;
            match self.commit_cycle(&session.machine, cycle).await {
                Ok(outcome) => {
                    session.cycles_committed += 1;
                    debug!("[{}] cycle stored in {}", session.machine, outcome.path().display());
                }
                Err(e) => error!("[{}] Cycle lost: {}", session.machine, e),
            }
            note_part_number(session);
        }

        session.status = if session.buffer.is_empty() {
            SessionStatus::AwaitingData
        } else {
            SessionStatus::Buffering
        };
    }

    async fn commit_cycle(&self, machine: &str, raw: String) -> Result<CommitOutcome, SessionError> {
        let fields = field_extractor::extract_fields(&raw);
        let record = CycleRecord::new(machine, fields, raw);

        let storage = Arc::clone(&self.storage);
        let mode = self.write_mode;
        let outcome = tokio::task::spawn_blocking(move || storage.commit(&record, mode))
            .await
            .map_err(|e| SessionError::CommitAborted(e.to_string()))??;
        Ok(outcome)
    }
}

fn note_part_number(session: &mut Session) {
    if let Some(tag) = session.buffer.capture_tag() {
        info!("[{}] Part number detected: {}", session.machine, tag);
    }
}
