//! Security event logging for audit trails.
//!
//! Structured logging for security-relevant events: authentication attempts,
//! host key decisions, and session open/close. All events carry
//! `target: "security"` so production deployments can filter them:
//!
//! ```bash
//! RUST_LOG=security=info
//! ```

use tracing::{info, warn};

/// Log an authentication attempt, before it is sent to the server.
pub fn log_auth_attempt(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication attempt"
    );
}

/// Log a successful authentication.
pub fn log_auth_success(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_success",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication succeeded"
    );
}

/// Log a failed authentication attempt.
pub fn log_auth_failure(host: &str, port: u16, username: &str, method: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log when a new or changed host key is accepted.
pub fn log_host_key_accepted(host: &str, port: u16, fingerprint: &str, was_changed: bool) {
    if was_changed {
        warn!(
            target: "security",
            event = "host_key_change_accepted",
            host = %host,
            port = port,
            fingerprint = %fingerprint,
            "User accepted CHANGED host key - potential security risk"
        );
    } else {
        info!(
            target: "security",
            event = "host_key_accepted",
            host = %host,
            port = port,
            fingerprint = %fingerprint,
            "User accepted new host key"
        );
    }
}

/// Log a rejected host key.
pub fn log_host_key_rejected(host: &str, port: u16, reason: &str) {
    info!(
        target: "security",
        event = "host_key_rejected",
        host = %host,
        port = port,
        reason = %reason,
        "Host key rejected"
    );
}

/// Log a detected host key change. This fires before any prompt, so the
/// incident is recorded even if the user later accepts.
pub fn log_host_key_changed(host: &str, port: u16, old_fingerprint: &str, new_fingerprint: &str) {
    warn!(
        target: "security",
        event = "host_key_changed",
        host = %host,
        port = port,
        old_fingerprint = %old_fingerprint,
        new_fingerprint = %new_fingerprint,
        "HOST KEY CHANGED - possible impersonation"
    );
}

/// Log a session teardown.
pub fn log_session_closed(host: &str, port: u16, clean: bool) {
    info!(
        target: "security",
        event = "session_closed",
        host = %host,
        port = port,
        clean = clean,
        "SSH session closed"
    );
}
