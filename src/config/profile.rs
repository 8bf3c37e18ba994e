//! Connection profiles and key identities.
//!
//! Profiles and identities are read-only inputs supplied by the embedding
//! application; this crate never persists them. Passwords and passphrases
//! arrive as [`SecretString`] so they are zeroized on drop and redacted in
//! debug output.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ConnectError;

fn default_port() -> u16 {
    22
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

/// Authentication method for a connection
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password authentication
    #[default]
    Password,
    /// A single named identity
    Key { identity_id: Uuid },
    /// Try every candidate identity in the order supplied
    Auto,
}

/// A private key identity candidate
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub key_path: PathBuf,
    #[serde(default)]
    pub passphrase: Option<SecretString>,
    /// Display label, e.g. "ed25519" (informational only)
    #[serde(default)]
    pub key_type: Option<String>,
}

/// Single connection profile
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionProfile {
    pub id: Uuid,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub auth: AuthMethod,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Terminal type requested for the PTY
    #[serde(default = "default_term")]
    pub term: String,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl ConnectionProfile {
    /// Structural validation run before any socket is opened
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.host.trim().is_empty() {
            return Err(ConnectError::InvalidProfile("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConnectError::InvalidProfile("port is zero".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(ConnectError::InvalidProfile(
                "username is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_profile() -> ConnectionProfile {
        ConnectionProfile {
            id: Uuid::new_v4(),
            host: "example.com".to_string(),
            port: 22,
            username: "alice".to_string(),
            auth: AuthMethod::Password,
            password: Some(SecretString::from("hunter2")),
            term: default_term(),
            cols: 80,
            rows: 24,
        }
    }

    #[test]
    fn valid_profile_passes_validation() {
        assert!(sample_profile().validate().is_ok());
    }

    #[test]
    fn empty_host_fails_validation() {
        let mut profile = sample_profile();
        profile.host = "  ".to_string();
        assert!(matches!(
            profile.validate(),
            Err(ConnectError::InvalidProfile(_))
        ));
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut profile = sample_profile();
        profile.port = 0;
        assert!(matches!(
            profile.validate(),
            Err(ConnectError::InvalidProfile(_))
        ));
    }

    #[test]
    fn empty_username_fails_validation() {
        let mut profile = sample_profile();
        profile.username = String::new();
        assert!(matches!(
            profile.validate(),
            Err(ConnectError::InvalidProfile(_))
        ));
    }

    #[test]
    fn profile_deserializes_with_defaults() {
        let json = r#"{
            "id": "6a1f0a52-8bfa-4b5e-9d37-0a2b6f7f3c11",
            "host": "example.com",
            "username": "alice"
        }"#;
        let profile: ConnectionProfile = serde_json::from_str(json).expect("parse");
        assert_eq!(profile.port, 22);
        assert_eq!(profile.term, "xterm-256color");
        assert_eq!(profile.cols, 80);
        assert_eq!(profile.rows, 24);
        assert_eq!(profile.auth, AuthMethod::Password);
        assert!(profile.password.is_none());
    }

    #[test]
    fn auth_method_deserializes_tagged() {
        let json = r#"{"type": "key", "identity_id": "6a1f0a52-8bfa-4b5e-9d37-0a2b6f7f3c11"}"#;
        let auth: AuthMethod = serde_json::from_str(json).expect("parse");
        assert!(matches!(auth, AuthMethod::Key { .. }));

        let auth: AuthMethod = serde_json::from_str(r#"{"type": "auto"}"#).expect("parse");
        assert_eq!(auth, AuthMethod::Auto);
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let profile = sample_profile();
        let debug = format!("{:?}", profile);
        assert!(!debug.contains("hunter2"));
    }
}
