//! # Network Listener Module
//!
//! Listener-mode connection manager: machines connect in, and every accepted
//! socket gets its own task running the shared [`SessionHandler`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │ Incoming        │───▶│ NetworkListener  │───▶│ SessionHandler   │
//! │ Connections     │    │ (accept loop)    │    │ (one task each)  │
//! └─────────────────┘    └──────────────────┘    └──────────────────┘
//! ```
//!
//! ## Shutdown
//!
//! The accept loop races every `accept()` against the stop token, so a stop is
//! observed immediately. Sessions already accepted are not cut off: they get
//! `drain_timeout` to finish on their own before their reads are cancelled.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use cnc_collector::network::network_listener::NetworkListener;
//! use cnc_collector::session_management::SessionHandler;
//! use cnc_collector::storage::{FileStorage, Storage, WriteMode};
//! use cnc_collector::error_handling::types::NetworkError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), NetworkError> {
//!     let storage: Arc<dyn Storage> = Arc::new(FileStorage::new("cnc_logs"));
//!     let handler = Arc::new(SessionHandler::new(storage, WriteMode::NewFile));
//!
//!     let listener = NetworkListener::bind("0.0.0.0:5062".parse().unwrap(), "Mill_1").await?;
//!     listener.run(handler, CancellationToken::new()).await
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error_handling::types::NetworkError;
use crate::network::types::ConnectionRole;
use crate::session_management::session::Session;
use crate::session_management::SessionHandler;

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// Pause after a failed accept() so a persistent error (e.g. out of descriptors) does not spin.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Accepts machine connections on one local address.
pub struct NetworkListener {
    listener: TcpListener,
    machine: String,
    drain_timeout: Duration,
    accepted: Arc<AtomicU64>,
}

impl NetworkListener {
    /// Binds `addr`. Failing to bind is the one network error that stops the collector.
    pub async fn bind(addr: SocketAddr, machine: &str) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("[{}] Could not bind {}: {}", machine, addr, e);
            NetworkError::BindFail(e)
        })?;
        Ok(Self {
            listener,
            machine: machine.to_string(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            accepted: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::BindFail)
    }

    /// Shared counter of accepted connections, readable while `run` is going.
    pub fn accepted_connections(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.accepted)
    }

    /// Accepts connections until `cancel` fires, then drains the open sessions.
    pub async fn run(self, handler: Arc<SessionHandler>, cancel: CancellationToken) -> Result<(), NetworkError> {
        let NetworkListener {
            listener,
            machine,
            drain_timeout,
            accepted,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!("[{}] Waiting for connections on {}", machine, addr);
        }

        let session_cancel = CancellationToken::new();
        let mut sessions: JoinSet<Session> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                incoming = listener.accept() => match incoming {
                    Ok((stream, addr)) => {
                        accepted.fetch_add(1, Ordering::Relaxed);
                        info!("[{}] Connection established from {}", machine, addr);
                        let session = Session::new(&machine, addr, ConnectionRole::Listener);
                        let handler = Arc::clone(&handler);
                        let token = session_cancel.clone();
                        sessions.spawn(async move { handler.run(stream, session, token).await });
                    }
                    Err(e) => {
                        error!("[{}] {}", machine, NetworkError::AcceptFailed(e));
                        tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                    }
                },
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    log_finished(&machine, finished);
                }
            }
        }

        drop(listener);
        info!("[{}] Stopped accepting connections", machine);

        if !sessions.is_empty() {
            info!(
                "[{}] Waiting up to {:?} for {} open session(s)",
                machine,
                drain_timeout,
                sessions.len()
            );
            let drained = tokio::time::timeout(drain_timeout, async {
                while let Some(finished) = sessions.join_next().await {
                    log_finished(&machine, finished);
                }
            })
            .await;

            if drained.is_err() {
                warn!(
                    "[{}] {} session(s) still open after {:?}, closing them",
                    machine,
                    sessions.len(),
                    drain_timeout
                );
                session_cancel.cancel();
                while let Some(finished) = sessions.join_next().await {
                    log_finished(&machine, finished);
                }
            }
        }

        info!("[{}] Server stopped", machine);
        Ok(())
    }
}

fn log_finished(machine: &str, finished: Result<Session, tokio::task::JoinError>) {
    match finished {
        Ok(session) => debug!(
            "[{}] {} session {} with {} finished",
            machine, session.role, session.id, session.remote_addr
        ),
        Err(e) => error!("[{}] session task failed: {}", machine, e),
    }
}
