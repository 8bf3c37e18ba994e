//! Trust-on-first-use host key verification.
//!
//! [`verify_host_key`] is the security-critical decision point invoked once
//! per handshake attempt with the server's raw key bytes. It consults the
//! trust store and, when a human decision is needed, suspends on the
//! registered [`VerifyBridge`] until the embedder answers. No bridge means
//! auto-reject.

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use chrono::Utc;

use crate::error::TrustStoreError;
use crate::fingerprint;
use crate::security_log;
use crate::trust::{HostKeyRecord, TrustStore};

/// Everything the embedder needs to render a verification dialog
#[derive(Debug, Clone)]
pub struct HostKeyPrompt {
    pub host: String,
    pub port: u16,
    pub fingerprint: String,
    pub legacy_fingerprint: String,
    pub key_type: String,
    pub algorithm: String,
    /// True when a different key was previously stored for this host
    pub is_changed: bool,
    pub old_fingerprint: Option<String>,
}

/// Human decision on a host key prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyDecision {
    /// Trust the key (sufficient for first contact only)
    Accept,
    /// Explicitly confirm replacing a previously stored key
    AcceptChanged,
    /// Abort the connection
    Reject,
}

/// UI collaborator that renders fingerprints and returns a decision.
///
/// A bridge that fails internally should resolve to [`VerifyDecision::Reject`].
pub trait VerifyBridge: Send + Sync {
    fn confirm(&self, prompt: HostKeyPrompt) -> BoxFuture<'static, VerifyDecision>;
}

/// Check the server's raw key bytes against the trust store.
///
/// Returns `Ok(true)` to let the handshake proceed. A persistence failure
/// fails closed: the caller must treat `Err` as a rejection.
pub async fn verify_host_key(
    trust: &Mutex<TrustStore>,
    bridge: Option<&dyn VerifyBridge>,
    host: &str,
    port: u16,
    raw_key: &[u8],
) -> Result<bool, TrustStoreError> {
    let fingerprint = fingerprint::sha256_fingerprint(raw_key);
    let legacy_fingerprint = fingerprint::md5_fingerprint(raw_key);
    let algorithm =
        fingerprint::wire_algorithm(raw_key).unwrap_or_else(|| "unknown".to_string());
    let key_type = fingerprint::key_family(&algorithm).to_string();

    let stored = {
        let store = trust.lock().await;
        store.get(host, port).cloned()
    };

    match stored {
        None => {
            let Some(bridge) = bridge else {
                security_log::log_host_key_rejected(host, port, "no verification bridge");
                return Ok(false);
            };

            let prompt = HostKeyPrompt {
                host: host.to_string(),
                port,
                fingerprint: fingerprint.clone(),
                legacy_fingerprint: legacy_fingerprint.clone(),
                key_type: key_type.clone(),
                algorithm: algorithm.clone(),
                is_changed: false,
                old_fingerprint: None,
            };
            tracing::debug!("First contact with {}:{} - {}", host, port, fingerprint);

            match bridge.confirm(prompt).await {
                VerifyDecision::Accept | VerifyDecision::AcceptChanged => {
                    let now = Utc::now();
                    let record = HostKeyRecord {
                        host: host.to_string(),
                        port,
                        fingerprint: fingerprint.clone(),
                        legacy_fingerprint: Some(legacy_fingerprint),
                        key_type,
                        algorithm,
                        first_seen: now,
                        last_seen: now,
                    };
                    trust.lock().await.upsert(record)?;
                    security_log::log_host_key_accepted(host, port, &fingerprint, false);
                    Ok(true)
                }
                VerifyDecision::Reject => {
                    security_log::log_host_key_rejected(host, port, "declined by user");
                    Ok(false)
                }
            }
        }
        Some(record) if record.fingerprint == fingerprint => {
            tracing::debug!("Host key verified for {}:{}", host, port);
            trust.lock().await.touch_last_seen(host, port)?;
            Ok(true)
        }
        Some(record) => {
            security_log::log_host_key_changed(host, port, &record.fingerprint, &fingerprint);

            let Some(bridge) = bridge else {
                security_log::log_host_key_rejected(host, port, "no verification bridge");
                return Ok(false);
            };

            let prompt = HostKeyPrompt {
                host: host.to_string(),
                port,
                fingerprint: fingerprint.clone(),
                legacy_fingerprint: legacy_fingerprint.clone(),
                key_type: key_type.clone(),
                algorithm: algorithm.clone(),
                is_changed: true,
                old_fingerprint: Some(record.fingerprint.clone()),
            };

            // A changed key needs the distinct confirmation; a plain Accept
            // is treated as a refusal.
            match bridge.confirm(prompt).await {
                VerifyDecision::AcceptChanged => {
                    let now = Utc::now();
                    let replacement = HostKeyRecord {
                        host: host.to_string(),
                        port,
                        fingerprint: fingerprint.clone(),
                        legacy_fingerprint: Some(legacy_fingerprint),
                        key_type,
                        algorithm,
                        first_seen: now,
                        last_seen: now,
                    };
                    trust.lock().await.upsert(replacement)?;
                    security_log::log_host_key_accepted(host, port, &fingerprint, true);
                    Ok(true)
                }
                VerifyDecision::Accept | VerifyDecision::Reject => {
                    security_log::log_host_key_rejected(host, port, "changed key declined");
                    Ok(false)
                }
            }
        }
    }
}
