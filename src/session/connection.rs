use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use russh::Disconnect;
use russh::client;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

use crate::config::{AuthMethod, ConnectionProfile, Identity};
use crate::error::ConnectError;
use crate::registry::SessionId;
use crate::security_log;
use crate::trust::TrustStore;
use crate::verify::VerifyBridge;

use super::auth::{self, ResolvedAuth};
use super::event::{SessionEventKind, SessionStatus};
use super::handler::ClientHandler;
use super::shell::ShellStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One SSH session from profile to closed transport.
///
/// The connection is one-shot: it moves from `Idle` through `Connecting` to
/// `Connected`, then ends in `Disconnected` or `Error`. A finished
/// connection is never restarted; the registry creates a fresh one instead.
pub struct Connection {
    id: SessionId,
    profile: ConnectionProfile,
    identities: Vec<Identity>,
    trust: Arc<Mutex<TrustStore>>,
    bridge: Option<Arc<dyn VerifyBridge>>,
    event_tx: mpsc::Sender<SessionEventKind>,
    status: Arc<Mutex<SessionStatus>>,
    shell: Mutex<Option<ShellStream>>,
    rejected: Arc<AtomicBool>,
    verify_pending: Arc<AtomicBool>,
    config: Arc<client::Config>,
}

impl Connection {
    pub fn new(
        id: SessionId,
        profile: ConnectionProfile,
        identities: Vec<Identity>,
        trust: Arc<Mutex<TrustStore>>,
        bridge: Option<Arc<dyn VerifyBridge>>,
        event_tx: mpsc::Sender<SessionEventKind>,
    ) -> Self {
        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            keepalive_interval: Some(Duration::from_secs(60)),
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            id,
            profile,
            identities,
            trust,
            bridge,
            event_tx,
            status: Arc::new(Mutex::new(SessionStatus::Idle)),
            shell: Mutex::new(None),
            rejected: Arc::new(AtomicBool::new(false)),
            verify_pending: Arc::new(AtomicBool::new(false)),
            config: Arc::new(config),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    pub async fn status(&self) -> SessionStatus {
        *self.status.lock().await
    }

    /// Run the full connect sequence: TCP, handshake with host-key
    /// verification, authentication per the profile's strategy, then PTY and
    /// shell acquisition.
    ///
    /// Only an `Idle` connection may start; anything else is refused with
    /// [`ConnectError::AlreadyActive`]. On failure the connection ends in
    /// `Error` and stays there, unless a concurrent `disconnect()` already
    /// moved it to `Disconnected`, which always wins.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        {
            let mut status = self.status.lock().await;
            if *status != SessionStatus::Idle {
                return Err(ConnectError::AlreadyActive);
            }
            self.profile.validate()?;
            *status = SessionStatus::Connecting;
        }
        let _ = self
            .event_tx
            .send(SessionEventKind::Status(SessionStatus::Connecting))
            .await;
        let _ = self
            .event_tx
            .send(SessionEventKind::Log(format!(
                "Connecting to {}:{}...",
                self.profile.host, self.profile.port
            )))
            .await;

        let result = match &self.profile.auth {
            AuthMethod::Password | AuthMethod::Key { .. } => {
                match ResolvedAuth::resolve(&self.profile, &self.identities).await {
                    Ok(auth) => self.attempt_and_install(auth).await,
                    Err(e) => Err(e),
                }
            }
            AuthMethod::Auto => {
                let outcome = auth::try_each_identity(&self.identities, move |identity| {
                    Box::pin(async move {
                        let key = auth::load_identity(identity).await?;
                        self.attempt_and_install(ResolvedAuth::Key(key)).await
                    })
                })
                .await;
                match outcome {
                    Ok(winner) => {
                        tracing::info!(
                            host = %self.profile.host,
                            identity = %winner,
                            "Auto auth selected identity"
                        );
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(()) => self.complete_connect().await,
            Err(e) => {
                {
                    let mut status = self.status.lock().await;
                    if *status == SessionStatus::Disconnected {
                        // Torn down mid-attempt; disconnect() already told
                        // subscribers, the failure only goes to the caller
                        return Err(e);
                    }
                    *status = SessionStatus::Error;
                }
                let _ = self
                    .event_tx
                    .send(SessionEventKind::ErrorOccurred(e.to_string()))
                    .await;
                let _ = self
                    .event_tx
                    .send(SessionEventKind::Status(SessionStatus::Error))
                    .await;
                Err(e)
            }
        }
    }

    /// Final transition of a successful attempt. Only Connecting may become
    /// Connected; if `disconnect()` ran while the handshake was in flight the
    /// teardown wins and the fresh shell is closed instead.
    async fn complete_connect(&self) -> Result<(), ConnectError> {
        {
            let mut status = self.status.lock().await;
            if *status != SessionStatus::Connecting {
                drop(status);
                if let Some(shell) = self.shell.lock().await.take() {
                    shell.close().await;
                }
                return Err(ConnectError::ConnectionAborted(
                    "session closed during connect".to_string(),
                ));
            }
            *status = SessionStatus::Connected;
        }

        let _ = self.event_tx.send(SessionEventKind::Ready).await;
        let _ = self
            .event_tx
            .send(SessionEventKind::Status(SessionStatus::Connected))
            .await;
        // Blank input coaxes the remote shell into printing a prompt
        if let Some(shell) = &*self.shell.lock().await {
            let _ = shell.send(b"\n").await;
        }
        Ok(())
    }

    async fn attempt_and_install(&self, auth: ResolvedAuth) -> Result<(), ConnectError> {
        let shell = self.attempt_connect(auth).await?;
        *self.shell.lock().await = Some(shell);
        Ok(())
    }

    /// One complete attempt with already-resolved credentials. Used once for
    /// password and single-key auth, once per candidate for auto auth.
    async fn attempt_connect(&self, auth: ResolvedAuth) -> Result<ShellStream, ConnectError> {
        let host = &self.profile.host;
        let port = self.profile.port;
        let addr = format!("{}:{}", host, port);

        // Each attempt gets a fresh verdict from the verifier
        self.rejected.store(false, Ordering::SeqCst);

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectError::ConnectionAborted(format!("connection to {} timed out", addr)))?
            .map_err(|e| {
                ConnectError::ConnectionAborted(format!("failed to connect to {}: {}", addr, e))
            })?;

        let handler = ClientHandler::new(
            host.clone(),
            port,
            self.trust.clone(),
            self.bridge.clone(),
            self.rejected.clone(),
            self.verify_pending.clone(),
            self.event_tx.clone(),
        );

        let mut handle = match client::connect_stream(self.config.clone(), stream, handler).await {
            Ok(handle) => handle,
            Err(e) => {
                // The handshake fails with a generic transport error when the
                // verifier returned false; the flag tells the cases apart.
                if self.rejected.load(Ordering::SeqCst) {
                    security_log::log_host_key_rejected(host, port, "declined by verifier");
                    return Err(ConnectError::HostKeyRejected {
                        host: host.clone(),
                        port,
                    });
                }
                return Err(e);
            }
        };

        self.authenticate(&mut handle, auth).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| ConnectError::ConnectionAborted(format!("channel open failed: {}", e)))?;

        let pty = channel
            .request_pty(
                false,
                &self.profile.term,
                self.profile.cols as u32,
                self.profile.rows as u32,
                0,
                0,
                &[],
            )
            .await;
        if let Err(e) = pty {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "pty request failed", "en")
                .await;
            return Err(ConnectError::ShellRequestFailed(format!(
                "PTY request failed: {}",
                e
            )));
        }

        if let Err(e) = channel.request_shell(false).await {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "shell request failed", "en")
                .await;
            return Err(ConnectError::ShellRequestFailed(format!(
                "shell request failed: {}",
                e
            )));
        }

        Ok(ShellStream::new(
            handle,
            channel,
            self.event_tx.clone(),
            self.status.clone(),
        ))
    }

    async fn authenticate(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        auth: ResolvedAuth,
    ) -> Result<(), ConnectError> {
        let host = &self.profile.host;
        let port = self.profile.port;
        let username = &self.profile.username;
        let method = auth.method_name();

        security_log::log_auth_attempt(host, port, username, method);

        let auth_result = match auth {
            ResolvedAuth::Password(password) => {
                handle
                    .authenticate_password(username, password.expose_secret())
                    .await
            }
            ResolvedAuth::Key(key) => handle.authenticate_publickey(username, key).await,
        };

        let auth_result = match auth_result {
            Ok(result) => result,
            Err(e) => {
                let reason = e.to_string();
                security_log::log_auth_failure(host, port, username, method, &reason);
                return Err(ConnectError::AuthenticationFailed(reason));
            }
        };

        if !auth_result.success() {
            let reason = "authentication rejected by server";
            security_log::log_auth_failure(host, port, username, method, reason);
            return Err(ConnectError::AuthenticationFailed(reason.to_string()));
        }

        security_log::log_auth_success(host, port, username, method);
        Ok(())
    }

    /// Tear the session down. Safe to call in any state and more than once;
    /// only the first call on a live session emits events.
    pub async fn disconnect(&self) {
        {
            let mut status = self.status.lock().await;
            if *status == SessionStatus::Disconnected {
                return;
            }
            let clean = *status == SessionStatus::Connected;
            *status = SessionStatus::Disconnected;
            drop(status);
            security_log::log_session_closed(&self.profile.host, self.profile.port, clean);
        }

        let shell = self.shell.lock().await.take();
        if let Some(shell) = shell {
            shell.close().await;
        }

        let _ = self
            .event_tx
            .send(SessionEventKind::Status(SessionStatus::Disconnected))
            .await;
        let _ = self.event_tx.send(SessionEventKind::Closed).await;
    }

    /// Forward terminal input. Returns false unless the session is connected
    /// and the shell accepted the bytes.
    pub async fn write(&self, data: &[u8]) -> bool {
        if *self.status.lock().await != SessionStatus::Connected {
            return false;
        }
        match &*self.shell.lock().await {
            Some(shell) => shell.send(data).await,
            None => false,
        }
    }

    /// Propagate a terminal resize to the remote PTY.
    pub async fn resize(&self, cols: u16, rows: u16) -> bool {
        if *self.status.lock().await != SessionStatus::Connected {
            return false;
        }
        match &*self.shell.lock().await {
            Some(shell) => shell.window_change(cols, rows).await,
            None => false,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("host", &self.profile.host)
            .field("port", &self.profile.port)
            .finish()
    }
}
