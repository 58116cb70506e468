use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::configuration::config::Config;
use crate::configuration::types::OperatingMode;
use crate::error_handling::types::*;
use crate::network::connection_manager::ConnectionManager;
use crate::network::dialer::Dialer;
use crate::network::network_listener::NetworkListener;
use crate::session_management::SessionHandler;
use crate::storage::types::WriteMode;
use crate::storage::{FileStorage, Storage};

/// Wires configuration, storage, session handling and the connection manager together.
pub struct Controller {
    pub config: Config,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        if let Err(err) = config.validate() {
            error!("Invalid configuration: {}", err);
            return Err(ControllerError::ConfigurationError(err));
        }
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops `run` when cancelled; clone it into a signal handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        info!("[{}] Shutting down...", self.config.machine_name());
        self.cancel.cancel();
    }

    fn session_handler(&self) -> Arc<SessionHandler> {
        let storage: Arc<dyn Storage> =
            Arc::new(FileStorage::new(&self.config.log_dir).with_retry_policy(self.config.retry_policy()));
        Arc::new(
            SessionHandler::new(storage, self.config.write_mode())
                .with_read_buffer_size(self.config.read_buffer_size),
        )
    }

    /// Builds the connection manager for the configured mode. Binding happens here.
    pub async fn connection_manager(&self) -> Result<ConnectionManager, ControllerError> {
        let machine = self.config.machine_name();
        let manager = match self.config.mode()? {
            OperatingMode::Listen { bind } => ConnectionManager::Listener(
                NetworkListener::bind(bind, &machine)
                    .await?
                    .with_drain_timeout(self.config.drain_timeout()),
            ),
            OperatingMode::Dial { target, port } => ConnectionManager::Dialer(
                Dialer::new(&target, port, &machine)
                    .with_reconnect_delay(self.config.reconnect_delay())
                    .with_connect_timeout(self.config.connect_timeout()),
            ),
        };
        Ok(manager)
    }

    /// Binds or starts dialing, then runs until the cancel token fires.
    pub async fn run(&self) -> Result<(), ControllerError> {
        let manager = self.connection_manager().await?;
        self.serve(manager).await
    }

    /// Runs an already built connection manager until the cancel token fires.
    pub async fn serve(&self, manager: ConnectionManager) -> Result<(), ControllerError> {
        let machine = self.config.machine_name();
        let write_mode = self.config.write_mode();

        info!("[{}] Mode: {}", machine, manager.mode_name());
        info!(
            "[{}] Logging mode: {}",
            machine,
            match write_mode {
                WriteMode::Append => "APPEND (one file per part number)",
                WriteMode::NewFile => "NEW FILE (one file per cycle)",
            }
        );
        info!("[{}] Log directory: {}", machine, self.config.log_dir.display());
        if write_mode == WriteMode::Append {
            warn!(
                "[{}] Append mode: close log files in other programs (e.g. spreadsheets) to avoid lock contention",
                machine
            );
        }

        manager.run(self.session_handler(), self.cancel.clone()).await?;
        info!("[{}] Collector stopped", machine);
        Ok(())
    }
}
