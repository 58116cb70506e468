//! Session management core module.
//!
//! This module provides the core types and submodules for handling one
//! connection to a machine controller: the session state and the handler that
//! turns its byte stream into committed cycle records.

/// Submodule for session data structures.
pub mod session;
/// Submodule for the per-connection handling loop.
pub mod session_handler;

pub use session::Session;
pub use session_handler::SessionHandler;

/// Represents the current state of a session.
///
/// Variants:
/// - `AwaitingData`: Connected, nothing buffered for the current cycle.
/// - `Buffering`: Part of a cycle has been received.
/// - `Committing`: A cycle boundary was seen and the record is being persisted.
/// - `Closed`: The socket is gone; the session will not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    AwaitingData,
    Buffering,
    Committing,
    Closed,
}
