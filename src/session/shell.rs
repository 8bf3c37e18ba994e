use std::sync::Arc;

use russh::client::Handle;
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::sync::{Mutex, mpsc};

use super::event::{SessionEventKind, SessionStatus};
use super::handler::ClientHandler;

/// Commands routed to the task that owns the PTY channel.
enum ChannelCommand {
    Data(Vec<u8>),
    WindowChange { cols: u32, rows: u32 },
}

/// Active interactive shell over an established SSH connection.
///
/// Owns the PTY channel through a spawned I/O task; callers talk to the
/// channel only through the command queue so the stream stays single-owner.
pub struct ShellStream {
    command_tx: mpsc::Sender<ChannelCommand>,
    handle: Arc<Mutex<Handle<ClientHandler>>>,
}

impl std::fmt::Debug for ShellStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellStream")
            .field("command_tx", &"<channel>")
            .field("handle", &"<handle>")
            .finish()
    }
}

impl ShellStream {
    /// Spawn the channel I/O task and return the stream handle.
    ///
    /// The task pumps remote output into `event_tx` and applies queued writes
    /// and window changes. When the channel closes from the remote side, the
    /// shared status flips to `Disconnected` and a final `Closed` event is
    /// emitted, unless a local close already ran.
    pub fn new(
        handle: Handle<ClientHandler>,
        mut channel: Channel<russh::client::Msg>,
        event_tx: mpsc::Sender<SessionEventKind>,
        status: Arc<Mutex<SessionStatus>>,
    ) -> Self {
        let (command_tx, mut command_rx) = mpsc::channel::<ChannelCommand>(256);

        let handle = Arc::new(Mutex::new(handle));
        let handle_for_task = handle.clone();

        tokio::spawn(async move {
            // Keep the connection handle alive for the life of the channel
            let _handle = handle_for_task;

            loop {
                tokio::select! {
                    msg = channel.wait() => {
                        match msg {
                            Some(ChannelMsg::Data { data }) => {
                                if event_tx.send(SessionEventKind::Data(data.to_vec())).await.is_err() {
                                    break;
                                }
                            }
                            Some(ChannelMsg::ExtendedData { data, .. }) => {
                                // stderr shares the terminal stream
                                if event_tx.send(SessionEventKind::Data(data.to_vec())).await.is_err() {
                                    break;
                                }
                            }
                            Some(ChannelMsg::ExitStatus { exit_status }) => {
                                tracing::debug!("Shell exit status: {}", exit_status);
                            }
                            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                                Self::mark_remote_closed(&status, &event_tx).await;
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                    cmd = command_rx.recv() => {
                        match cmd {
                            Some(ChannelCommand::Data(data)) => {
                                if let Err(e) = channel.data(&data[..]).await {
                                    tracing::error!("Failed to send data: {}", e);
                                }
                            }
                            Some(ChannelCommand::WindowChange { cols, rows }) => {
                                if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                                    tracing::error!("Failed to send window change: {}", e);
                                }
                            }
                            None => {
                                // Local side dropped the stream, stop pumping
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self { command_tx, handle }
    }

    /// Only a still-connected session transitions; a session already closed
    /// locally keeps its state and gets no duplicate events.
    async fn mark_remote_closed(
        status: &Mutex<SessionStatus>,
        event_tx: &mpsc::Sender<SessionEventKind>,
    ) {
        let mut status = status.lock().await;
        if *status == SessionStatus::Connected {
            *status = SessionStatus::Disconnected;
            drop(status);
            let _ = event_tx
                .send(SessionEventKind::Status(SessionStatus::Disconnected))
                .await;
            let _ = event_tx.send(SessionEventKind::Closed).await;
        }
    }

    /// Queue terminal input for the remote shell. Returns false once the
    /// channel task has exited.
    pub async fn send(&self, data: &[u8]) -> bool {
        self.command_tx
            .send(ChannelCommand::Data(data.to_vec()))
            .await
            .is_ok()
    }

    /// Queue a window size change for the remote PTY.
    pub async fn window_change(&self, cols: u16, rows: u16) -> bool {
        self.command_tx
            .send(ChannelCommand::WindowChange {
                cols: cols as u32,
                rows: rows as u32,
            })
            .await
            .is_ok()
    }

    /// Tear down the transport. Dropping `command_tx` stops the pump task.
    pub async fn close(self) {
        let handle = self.handle.lock().await;
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            tracing::debug!("Disconnect message failed: {}", e);
        }
    }
}
