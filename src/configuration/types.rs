use std::net::SocketAddr;

/// Which connection manager the collector runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingMode {
    /// Bind `bind` and wait for machines to connect.
    Listen { bind: SocketAddr },
    /// Connect out to `target:port` and keep reconnecting.
    Dial { target: String, port: u16 },
}
