//! Embeddable SSH session manager with trust-on-first-use host keys.
//!
//! The crate drives interactive SSH sessions for a host application: the
//! [`registry::SessionRegistry`] owns every live connection, fans session
//! events out to subscribers, and buffers recent output for late attachers.
//! Host keys are checked against a persistent [`trust::TrustStore`]; unknown
//! and changed keys are resolved through a [`verify::VerifyBridge`] supplied
//! by the embedder, or rejected when none is installed.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod registry;
pub mod session;
pub mod trust;
pub mod verify;

pub(crate) mod security_log;

pub use config::{AuthMethod, ConnectionProfile, Identity};
pub use error::{ConnectError, SessionError, TrustStoreError};
pub use registry::{RegistryConfig, SessionId, SessionInfo, SessionRegistry};
pub use session::{BufferedEvent, SessionEvent, SessionEventKind, SessionStatus};
pub use trust::{HostKeyRecord, TrustStore};
pub use verify::{HostKeyPrompt, VerifyBridge, VerifyDecision};
