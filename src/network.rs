pub mod connection_manager;
pub mod dialer;
pub mod network_listener;
pub mod types;

pub use connection_manager::ConnectionManager;
pub use dialer::{Dialer, DialerStats};
pub use network_listener::NetworkListener;
pub use types::ConnectionRole;
