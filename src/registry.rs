//! Session registry.
//!
//! The registry owns every live [`Connection`], fans its events out to
//! subscribers over a broadcast channel, and keeps a bounded per-session
//! catch-up buffer so a UI attaching late can replay recent output.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast, mpsc};
use uuid::Uuid;

use crate::config::{ConnectionProfile, Identity};
use crate::error::SessionError;
use crate::session::connection::Connection;
use crate::session::event::{BufferedEvent, SessionEvent, SessionEventKind, SessionStatus};
use crate::trust::TrustStore;
use crate::verify::VerifyBridge;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const BROADCAST_CAPACITY: usize = 1024;

/// Opaque registry-scoped session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub(crate) fn new(seq: u64) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(format!("{}-{}", millis, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tunables for buffering and teardown
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum replayable events retained per session; oldest evicted first
    pub buffer_capacity: usize,
    /// How long a closed session's buffer stays readable before eviction
    pub evict_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            evict_grace: Duration::from_secs(5),
        }
    }
}

/// Snapshot of one session's public state
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub profile_id: Uuid,
    pub host: String,
    pub port: u16,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub error: Option<String>,
}

struct SessionEntry {
    connection: Arc<Connection>,
    info: SessionInfo,
}

struct RegistryInner {
    config: RegistryConfig,
    trust: Arc<Mutex<TrustStore>>,
    bridge: std::sync::RwLock<Option<Arc<dyn VerifyBridge>>>,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    buffers: Mutex<HashMap<SessionId, VecDeque<BufferedEvent>>>,
    events: broadcast::Sender<SessionEvent>,
    seq: AtomicU64,
}

impl RegistryInner {
    /// Append a replayable event, evicting the oldest entry at capacity.
    async fn buffer_event(&self, id: &SessionId, event: BufferedEvent) {
        let mut buffers = self.buffers.lock().await;
        if let Some(buffer) = buffers.get_mut(id) {
            if buffer.len() >= self.config.buffer_capacity {
                buffer.pop_front();
            }
            buffer.push_back(event);
        }
    }
}

/// Shared handle to the session registry. Cloning is cheap; all clones see
/// the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(trust: TrustStore) -> Self {
        Self::with_config(trust, RegistryConfig::default())
    }

    pub fn with_config(trust: TrustStore, config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(RegistryInner {
                config,
                trust: Arc::new(Mutex::new(trust)),
                bridge: std::sync::RwLock::new(None),
                sessions: Mutex::new(HashMap::new()),
                buffers: Mutex::new(HashMap::new()),
                events,
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to the merged event stream of all sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Install or clear the host-key verification bridge. Without a bridge,
    /// unknown and changed host keys are rejected.
    pub fn set_verify_bridge(&self, bridge: Option<Arc<dyn VerifyBridge>>) {
        if let Ok(mut slot) = self.inner.bridge.write() {
            *slot = bridge;
        }
    }

    fn next_id(&self) -> SessionId {
        SessionId::new(self.inner.seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Create a session for the profile and run its connect sequence to
    /// completion. The session is registered before the handshake starts so
    /// subscribers see its progress events; a failed connect removes it
    /// again and the error propagates.
    pub async fn create_session(
        &self,
        profile: ConnectionProfile,
        identities: Vec<Identity>,
    ) -> Result<SessionId, SessionError> {
        profile.validate().map_err(SessionError::Connect)?;

        let id = self.next_id();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let bridge = self
            .inner
            .bridge
            .read()
            .ok()
            .and_then(|slot| (*slot).clone());

        let connection = Arc::new(Connection::new(
            id.clone(),
            profile.clone(),
            identities,
            self.inner.trust.clone(),
            bridge,
            event_tx,
        ));

        let info = SessionInfo {
            id: id.clone(),
            profile_id: profile.id,
            host: profile.host.clone(),
            port: profile.port,
            status: SessionStatus::Idle,
            started_at: Utc::now(),
            error: None,
        };

        // The relay exits on its own once the connection drops its sender
        spawn_relay(self.inner.clone(), id.clone(), event_rx);

        {
            let mut sessions = self.inner.sessions.lock().await;
            sessions.insert(
                id.clone(),
                SessionEntry {
                    connection: connection.clone(),
                    info,
                },
            );
        }
        self.inner
            .buffers
            .lock()
            .await
            .insert(id.clone(), VecDeque::new());

        if let Err(e) = connection.connect().await {
            // Dropping the entry releases the last event sender once this
            // function returns, letting the relay drain and exit on its own
            // so subscribers still see the failure events.
            self.inner.sessions.lock().await.remove(&id);
            self.inner.buffers.lock().await.remove(&id);
            return Err(SessionError::Connect(e));
        }

        Ok(id)
    }

    /// Snapshot of one session, if it exists.
    pub async fn session_info(&self, id: &SessionId) -> Option<SessionInfo> {
        self.inner
            .sessions
            .lock()
            .await
            .get(id)
            .map(|entry| entry.info.clone())
    }

    /// Snapshots of every registered session.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.inner
            .sessions
            .lock()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Replayable events retained for the session. Also answers for recently
    /// closed sessions until the grace window elapses.
    pub async fn history(&self, id: &SessionId) -> Vec<BufferedEvent> {
        self.inner
            .buffers
            .lock()
            .await
            .get(id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forward terminal input to the session. False for unknown sessions and
    /// sessions that are not connected.
    pub async fn write_to_session(&self, id: &SessionId, data: &[u8]) -> bool {
        let connection = {
            let sessions = self.inner.sessions.lock().await;
            sessions.get(id).map(|entry| entry.connection.clone())
        };
        match connection {
            Some(connection) => connection.write(data).await,
            None => false,
        }
    }

    /// Propagate a terminal resize to the session's PTY.
    pub async fn resize_session(&self, id: &SessionId, cols: u16, rows: u16) -> bool {
        let connection = {
            let sessions = self.inner.sessions.lock().await;
            sessions.get(id).map(|entry| entry.connection.clone())
        };
        match connection {
            Some(connection) => connection.resize(cols, rows).await,
            None => false,
        }
    }

    /// Close and unregister a session. Its buffer survives for the grace
    /// window so a subscriber processing the `Closed` event can still fetch
    /// history.
    pub async fn close_session(&self, id: &SessionId) -> Result<(), SessionError> {
        let entry = self
            .inner
            .sessions
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;

        entry.connection.disconnect().await;

        let inner = self.inner.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.evict_grace).await;
            inner.buffers.lock().await.remove(&id);
        });

        Ok(())
    }

    /// Close every session, isolating failures per session.
    pub async fn close_all_sessions(&self) {
        let ids: Vec<SessionId> = self.inner.sessions.lock().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.close_session(&id).await {
                tracing::warn!("Failed to close session {}: {}", id, e);
            }
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Pump one session's events into the shared broadcast stream, maintaining
/// the session snapshot and catch-up buffer on the way through.
fn spawn_relay(inner: Arc<RegistryInner>, id: SessionId, mut event_rx: mpsc::Receiver<SessionEventKind>) {
    tokio::spawn(async move {
        while let Some(kind) = event_rx.recv().await {
            match &kind {
                SessionEventKind::Status(status) => {
                    let mut sessions = inner.sessions.lock().await;
                    if let Some(entry) = sessions.get_mut(&id) {
                        entry.info.status = *status;
                    }
                }
                SessionEventKind::ErrorOccurred(message) => {
                    {
                        let mut sessions = inner.sessions.lock().await;
                        if let Some(entry) = sessions.get_mut(&id) {
                            entry.info.error = Some(message.clone());
                        }
                    }
                    // Failures stay replayable alongside terminal output
                    inner
                        .buffer_event(&id, BufferedEvent::Log(message.clone()))
                        .await;
                }
                SessionEventKind::Data(data) => {
                    inner
                        .buffer_event(&id, BufferedEvent::Data(data.clone()))
                        .await;
                }
                SessionEventKind::Log(line) => {
                    inner
                        .buffer_event(&id, BufferedEvent::Log(line.clone()))
                        .await;
                }
                SessionEventKind::Ready | SessionEventKind::Closed => {}
            }

            // Lagging subscribers drop events; the buffer covers catch-up
            let _ = inner.events.send(SessionEvent {
                session_id: id.clone(),
                kind,
            });
        }
    });
}
