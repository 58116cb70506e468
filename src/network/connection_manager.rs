use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error_handling::types::NetworkError;
use crate::network::dialer::Dialer;
use crate::network::network_listener::NetworkListener;
use crate::session_management::SessionHandler;

/// Produces sessions for the shared [`SessionHandler`], in one of two modes.
pub enum ConnectionManager {
    Listener(NetworkListener),
    Dialer(Dialer),
}

impl ConnectionManager {
    /// Runs the accept or dial loop until `cancel` fires.
    pub async fn run(self, handler: Arc<SessionHandler>, cancel: CancellationToken) -> Result<(), NetworkError> {
        match self {
            ConnectionManager::Listener(listener) => listener.run(handler, cancel).await,
            ConnectionManager::Dialer(dialer) => dialer.run(handler, cancel).await,
        }
    }

    /// Bound address in listener mode; a dialer has none until it connects.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            ConnectionManager::Listener(listener) => listener.local_addr().ok(),
            ConnectionManager::Dialer(_) => None,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            ConnectionManager::Listener(_) => "SERVER",
            ConnectionManager::Dialer(_) => "CLIENT",
        }
    }
}
