//! Dialer-mode connection manager.
//!
//! The collector connects out to the machine, runs one session until the peer
//! goes away, waits `reconnect_delay` and tries again, for as long as the stop
//! token allows. Exactly one session is live at a time.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error_handling::types::NetworkError;
use crate::network::types::ConnectionRole;
use crate::session_management::session::Session;
use crate::session_management::SessionHandler;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Counters updated by a running [`Dialer`].
#[derive(Debug, Default)]
pub struct DialerStats {
    attempts: AtomicU64,
    failures: AtomicU64,
    sessions: AtomicU64,
}

impl DialerStats {
    /// Connection attempts started.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Attempts that ended without a connection.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Sessions run to completion or stop.
    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }
}

pub struct Dialer {
    host: String,
    port: u16,
    machine: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    stats: Arc<DialerStats>,
}

impl Dialer {
    pub fn new(host: &str, port: u16, machine: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            machine: machine.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stats: Arc::new(DialerStats::default()),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn stats(&self) -> Arc<DialerStats> {
        Arc::clone(&self.stats)
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> Result<(TcpStream, SocketAddr), NetworkError> {
        let dial = TcpStream::connect((self.host.as_str(), self.port));
        let stream = match tokio::time::timeout(self.connect_timeout, dial).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(NetworkError::ConnectFailed(e)),
            Err(_) => return Err(NetworkError::ConnectTimeout(self.target())),
        };
        let peer = stream.peer_addr().map_err(NetworkError::ConnectFailed)?;
        Ok((stream, peer))
    }

    /// Connects, runs a session, backs off and repeats until `cancel` fires.
    ///
    /// Connection failures are logged and retried; this only returns once stopped.
    pub async fn run(self, handler: Arc<SessionHandler>, cancel: CancellationToken) -> Result<(), NetworkError> {
        info!("[{}] Starting in CLIENT mode, target {}", self.machine, self.target());

        while !cancel.is_cancelled() {
            self.stats.attempts.fetch_add(1, Ordering::SeqCst);
            info!("[{}] Attempting to connect to {}...", self.machine, self.target());

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                connected = self.connect() => connected,
            };

            match connected {
                Ok((stream, peer)) => {
                    info!("[{}] Successfully connected!", self.machine);
                    let session = Session::new(&self.machine, peer, ConnectionRole::Dialer);
                    handler.run(stream, session, cancel.clone()).await;
                    self.stats.sessions.fetch_add(1, Ordering::SeqCst);
                }
                Err(NetworkError::ConnectFailed(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    self.stats.failures.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        "[{}] Connection refused. Machine may be offline or not accepting connections.",
                        self.machine
                    );
                }
                Err(e) => {
                    self.stats.failures.fetch_add(1, Ordering::SeqCst);
                    warn!("[{}] {}", self.machine, e);
                }
            }

            if cancel.is_cancelled() {
                break;
            }
            info!("[{}] Reconnecting in {:?}...", self.machine, self.reconnect_delay);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!("[{}] Client stopped", self.machine);
        Ok(())
    }
}
