//! russh client handler.
//!
//! The handler's only real job is `check_server_key`: it bridges the
//! transport's handshake into [`crate::verify::verify_host_key`], suspending
//! the handshake until the trust store (and possibly a human) has answered.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use russh::client::Handler;
use russh::keys::PublicKey;
use tokio::sync::{Mutex, mpsc};

use crate::error::ConnectError;
use crate::session::event::SessionEventKind;
use crate::trust::TrustStore;
use crate::verify::{self, VerifyBridge};

pub struct ClientHandler {
    host: String,
    port: u16,
    trust: Arc<Mutex<TrustStore>>,
    bridge: Option<Arc<dyn VerifyBridge>>,
    /// Set exactly once when verification is explicitly declined; read by the
    /// connect path to tell HostKeyRejected apart from a generic abort.
    rejected: Arc<AtomicBool>,
    /// Guards against a second handshake starting while a verification
    /// prompt is still outstanding on this connection.
    verify_pending: Arc<AtomicBool>,
    event_tx: mpsc::Sender<SessionEventKind>,
}

impl ClientHandler {
    pub fn new(
        host: String,
        port: u16,
        trust: Arc<Mutex<TrustStore>>,
        bridge: Option<Arc<dyn VerifyBridge>>,
        rejected: Arc<AtomicBool>,
        verify_pending: Arc<AtomicBool>,
        event_tx: mpsc::Sender<SessionEventKind>,
    ) -> Self {
        Self {
            host,
            port,
            trust,
            bridge,
            rejected,
            verify_pending,
            event_tx,
        }
    }
}

impl Handler for ClientHandler {
    type Error = ConnectError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let host = self.host.clone();
        let port = self.port;
        let trust = self.trust.clone();
        let bridge = self.bridge.clone();
        let rejected = self.rejected.clone();
        let verify_pending = self.verify_pending.clone();
        let event_tx = self.event_tx.clone();
        let key = server_public_key.clone();

        async move {
            if verify_pending.swap(true, Ordering::SeqCst) {
                return Err(ConnectError::ConnectionAborted(
                    "host key verification already pending".to_string(),
                ));
            }

            let raw_key = key.to_bytes().map_err(|e| {
                verify_pending.store(false, Ordering::SeqCst);
                ConnectError::ConnectionAborted(format!("failed to encode host key: {}", e))
            })?;

            let result =
                verify::verify_host_key(&trust, bridge.as_deref(), &host, port, &raw_key).await;
            verify_pending.store(false, Ordering::SeqCst);

            match result {
                Ok(true) => Ok(true),
                Ok(false) => {
                    rejected.store(true, Ordering::SeqCst);
                    let _ = event_tx
                        .send(SessionEventKind::Log(format!(
                            "Host key for {}:{} was not accepted",
                            host, port
                        )))
                        .await;
                    Ok(false)
                }
                Err(e) => {
                    // Persistence failure: fail closed, but this is not an
                    // explicit decline so the rejected flag stays clear.
                    tracing::error!("Trust store failure for {}:{}: {}", host, port, e);
                    let _ = event_tx
                        .send(SessionEventKind::Log(format!(
                            "Trust store failure while verifying {}:{}: {}",
                            host, port, e
                        )))
                        .await;
                    Ok(false)
                }
            }
        }
    }
}
