use std::fmt;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// The machine connected to our listening socket.
    Listener,
    /// We connected out to the machine.
    Dialer,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRole::Listener => write!(f, "listener"),
            ConnectionRole::Dialer => write!(f, "dialer"),
        }
    }
}
