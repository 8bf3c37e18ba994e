use std::path::PathBuf;
use thiserror::Error;

use crate::registry::SessionId;

/// Errors raised while establishing or tearing down a connection
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Identity not found: {0}")]
    KeyNotFound(uuid::Uuid),

    #[error("Failed to read key file '{}': {reason}", path.display())]
    KeyReadFailed { path: PathBuf, reason: String },

    #[error("No candidate identities supplied")]
    NoKeysAvailable,

    #[error("All identities failed, last error: {0}")]
    AllKeysFailed(#[source] Box<ConnectError>),

    #[error("Host key rejected for {host}:{port}")]
    HostKeyRejected { host: String, port: u16 },

    #[error("Shell request failed: {0}")]
    ShellRequestFailed(String),

    #[error("Connection aborted: {0}")]
    ConnectionAborted(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection is already active")]
    AlreadyActive,
}

impl From<russh::Error> for ConnectError {
    fn from(err: russh::Error) -> Self {
        ConnectError::ConnectionAborted(err.to_string())
    }
}

/// Errors surfaced by registry-level session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Trust-store persistence errors
#[derive(Error, Debug)]
pub enum TrustStoreError {
    #[error("Failed to read trust store '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write trust store '{}': {source}", path.display())]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse trust store: {0}")]
    Parse(#[from] serde_json::Error),
}
