//! SSH session layer.
//!
//! Connection setup, authentication strategy selection, host-key checking
//! during the handshake, and the interactive shell stream.

pub mod auth;
pub mod connection;
pub mod event;
pub mod handler;
pub mod shell;

pub use connection::Connection;
pub use event::{BufferedEvent, SessionEvent, SessionEventKind, SessionStatus};
pub use shell::ShellStream;
