//! Session events and statuses.
//!
//! Events are a closed tagged set; subscribers receive [`SessionEvent`]
//! envelopes from the registry and demultiplex by session id.

use crate::registry::SessionId;

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl SessionStatus {
    /// Whether the session has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Disconnected | SessionStatus::Error)
    }
}

/// One event emitted by a session's connection
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    /// Transport ready and shell acquired
    Ready,
    /// Bytes from the remote shell (stdout and stderr merged, in order)
    Data(Vec<u8>),
    /// Status transition
    Status(SessionStatus),
    /// Failure description surfaced to the UI
    ErrorOccurred(String),
    /// Session torn down
    Closed,
    /// Human-readable progress/diagnostic line
    Log(String),
}

/// Event envelope fanned out to registry subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub kind: SessionEventKind,
}

/// Replayable entry retained in the per-session catch-up buffer
#[derive(Debug, Clone, PartialEq)]
pub enum BufferedEvent {
    Data(Vec<u8>),
    Log(String),
}
