use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::data_capture::CycleBuffer;
use crate::network::types::ConnectionRole;
use crate::session_management::SessionStatus;

/// One active or attempted connection to a machine.
///
/// Owned by exactly one handler task; nothing in it is shared with other sessions.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    /// Machine identity used in file names and log prefixes.
    pub machine: String,
    pub remote_addr: SocketAddr,
    pub role: ConnectionRole,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub bytes_received: u64,
    pub cycles_committed: u64,
    pub status: SessionStatus,
    pub buffer: CycleBuffer,
}

impl Session {
    pub fn new(machine: &str, remote_addr: SocketAddr, role: ConnectionRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            machine: machine.to_string(),
            remote_addr,
            role,
            start_time: Utc::now(),
            end_time: None,
            bytes_received: 0,
            cycles_committed: 0,
            status: SessionStatus::AwaitingData,
            buffer: CycleBuffer::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status != SessionStatus::Closed
    }

    /// Marks the session closed and drops anything still buffered.
    pub fn close(&mut self) {
        self.status = SessionStatus::Closed;
        self.end_time = Some(Utc::now());
        self.buffer.clear();
    }
}
