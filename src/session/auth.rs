//! Authentication strategy selection.
//!
//! Strategies resolve to concrete credentials before the handshake starts:
//! password, a single named identity, or the auto strategy which runs one
//! full connect attempt per candidate identity, strictly in the order
//! supplied. The sequential loop is deliberate: parallel attempts would race
//! concurrent host-key prompts for the same target.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use russh::keys::{HashAlg, PrivateKeyWithHashAlg};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::config::paths;
use crate::config::{AuthMethod, ConnectionProfile, Identity};
use crate::error::ConnectError;

/// Resolved credentials for one connect attempt
pub enum ResolvedAuth {
    Password(SecretString),
    Key(PrivateKeyWithHashAlg),
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            ResolvedAuth::Key(_) => f.debug_tuple("Key").field(&"[KEY]").finish(),
        }
    }
}

impl ResolvedAuth {
    /// Method name used in audit logs
    pub fn method_name(&self) -> &'static str {
        match self {
            ResolvedAuth::Password(_) => "password",
            ResolvedAuth::Key(_) => "publickey",
        }
    }

    /// Resolve the profile's strategy to credentials.
    ///
    /// The auto strategy is driven by the connect loop instead; calling this
    /// with [`AuthMethod::Auto`] is a caller bug.
    pub async fn resolve(
        profile: &ConnectionProfile,
        identities: &[Identity],
    ) -> Result<Self, ConnectError> {
        match &profile.auth {
            AuthMethod::Password => match &profile.password {
                Some(password) if !password.expose_secret().is_empty() => {
                    Ok(ResolvedAuth::Password(password.clone()))
                }
                _ => Err(ConnectError::MissingCredential(
                    "password auth selected but no password supplied".to_string(),
                )),
            },
            AuthMethod::Key { identity_id } => {
                let identity = find_identity(*identity_id, identities)?;
                Ok(ResolvedAuth::Key(load_identity(identity).await?))
            }
            AuthMethod::Auto => Err(ConnectError::InvalidProfile(
                "auto auth must be resolved per candidate".to_string(),
            )),
        }
    }
}

/// Look up an identity by id among the supplied candidates
pub fn find_identity(id: Uuid, identities: &[Identity]) -> Result<&Identity, ConnectError> {
    identities
        .iter()
        .find(|identity| identity.id == id)
        .ok_or(ConnectError::KeyNotFound(id))
}

/// Load an identity's private key, applying its passphrase if present
pub async fn load_identity(identity: &Identity) -> Result<PrivateKeyWithHashAlg, ConnectError> {
    let path = paths::expand_tilde(&identity.key_path.to_string_lossy());
    let passphrase = identity.passphrase.as_ref().map(|p| p.expose_secret());
    load_key_file(&path, passphrase).await
}

async fn load_key_file(
    path: &Path,
    passphrase: Option<&str>,
) -> Result<PrivateKeyWithHashAlg, ConnectError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConnectError::KeyReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    // Catch the common mistake of pointing a profile at the .pub file
    let first_line = content.lines().next().unwrap_or("");
    if first_line.starts_with("ssh-") || first_line.starts_with("ecdsa-") {
        return Err(ConnectError::KeyReadFailed {
            path: path.to_path_buf(),
            reason: "file contains a public key, not a private key".to_string(),
        });
    }
    if !first_line.starts_with("-----BEGIN") {
        return Err(ConnectError::KeyReadFailed {
            path: path.to_path_buf(),
            reason: "not a valid SSH private key".to_string(),
        });
    }

    let key =
        russh::keys::load_secret_key(path, passphrase).map_err(|e| ConnectError::KeyReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    // RSA keys sign with SHA-512; other key types use their native algorithm
    let hash_alg = if key.algorithm().is_rsa() {
        Some(HashAlg::Sha512)
    } else {
        None
    };
    Ok(PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
}

/// Run one full attempt per candidate identity, in order, stopping at the
/// first success. Returns the id of the identity that succeeded.
pub async fn try_each_identity<'a, F>(
    identities: &'a [Identity],
    mut attempt: F,
) -> Result<Uuid, ConnectError>
where
    F: FnMut(&'a Identity) -> BoxFuture<'a, Result<(), ConnectError>>,
{
    if identities.is_empty() {
        return Err(ConnectError::NoKeysAvailable);
    }

    let mut last_error = None;
    for identity in identities {
        match attempt(identity).await {
            Ok(()) => return Ok(identity.id),
            Err(e) => {
                tracing::debug!("Identity {} failed: {}", identity.id, e);
                last_error = Some(e);
            }
        }
    }

    Err(ConnectError::AllKeysFailed(Box::new(
        last_error.expect("at least one attempt ran"),
    )))
}
