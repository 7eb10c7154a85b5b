//! Per-connection handler: registration, the outbound writer, and command
//! routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `register` within [`REGISTER_TIMEOUT`] → player id
//!   2. Spawn the writer task that drains the player's outbound queue
//!   3. Reply `registered`, then bind the queue in the presence registry
//!   4. If the socket was opened on `/room/<code>`, join that room
//!   5. Loop: receive commands → dispatch to the coordinator → reply
//!
//! Replies and room broadcasts share the one outbound queue, so a client
//! sees them in the order the server produced them.

use std::sync::Arc;

use mathduel_presence::{Frame, PlayerSender};
use mathduel_protocol::{
    Codec, Command, PlayerId, ProtocolError, RoomId, ServerEvent,
};
use mathduel_room::Coordinator;
use mathduel_transport::{
    Connection, ConnectionId, TransportError, WebSocketConnection,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::DuelError;
use crate::server::{ConnectionSettings, REGISTER_TIMEOUT, ServerState};

/// Drop guard that releases the player's presence binding when the
/// handler exits.
///
/// `Drop` is synchronous, so the async unregister runs as a
/// fire-and-forget task. Only the binding this connection still owns is
/// released; a newer connection for the same player is left alone.
struct PresenceGuard {
    conn_id: ConnectionId,
    coordinator: Arc<Coordinator>,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            coordinator.unregister(conn_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), DuelError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Register ---
    let player_id = await_register(&conn, &state).await?;

    // --- Step 2: Outbound queue ---
    let (tx, rx) = mpsc::channel(state.settings.outbound_buffer);
    let _writer = spawn_writer(Arc::clone(&conn), rx, state.settings);

    let session = Session {
        conn_id,
        player_id,
        tx,
        state: Arc::clone(&state),
    };

    // The reply is queued before the binding exists, so it lands ahead of
    // the room_update a returning player triggers.
    session
        .reply(&ServerEvent::Registered {
            player_id: session.player_id.clone(),
        })
        .await?;
    state
        .coordinator
        .register(session.player_id.clone(), conn_id, session.tx.clone())
        .await?;
    let _guard = PresenceGuard {
        conn_id,
        coordinator: Arc::clone(&state.coordinator),
    };

    // --- Step 3: Share-link join ---
    if let Some(room_id) = room_from_path(conn.path()) {
        tracing::debug!(player_id = %session.player_id, %room_id, "joining room from request path");
        session.dispatch(Command::JoinRoom { room_id }).await?;
    }

    // --- Step 4: Command loop ---
    loop {
        let data = match tokio::time::timeout(
            state.settings.idle_timeout,
            conn.recv(),
        )
        .await
        {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(player_id = %session.player_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(player_id = %session.player_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(player_id = %session.player_id, "connection idle, closing");
                break;
            }
        };

        let command: Command = match state.codec.decode(&data) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    player_id = %session.player_id, error = %e, "rejected command"
                );
                session.error(400, &format!("invalid command: {e}")).await?;
                continue;
            }
        };

        session.dispatch(command).await?;
    }

    // _guard drops here → presence binding released, player offline.
    // The writer exits once every sender for its queue is gone.
    Ok(())
}

/// Extracts the room code from a `/room/<code>` request path.
fn room_from_path(path: &str) -> Option<RoomId> {
    let code = path.strip_prefix("/room/")?.rsplit('/').next()?.trim();
    if code.is_empty() {
        return None;
    }
    Some(RoomId::from(code))
}

/// Waits for the first frame and requires it to be `register`.
///
/// Anything else is answered with an `error` frame and ends the
/// connection.
async fn await_register<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
) -> Result<PlayerId, DuelError> {
    let data = match tokio::time::timeout(REGISTER_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before register".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(DuelError::Transport(e)),
        Err(_) => {
            send_error(conn, &state.codec, 408, "register timed out").await?;
            return Err(ProtocolError::InvalidMessage(
                "register timed out".into(),
            )
            .into());
        }
    };

    let player_id = match state.codec.decode::<Command>(&data) {
        Ok(Command::Register { player_id }) => player_id,
        Ok(other) => {
            send_error(conn, &state.codec, 400, "expected register").await?;
            return Err(ProtocolError::InvalidMessage(format!(
                "first message must be register, got {}",
                other.kind()
            ))
            .into());
        }
        Err(e) => {
            send_error(conn, &state.codec, 400, &format!("invalid command: {e}"))
                .await?;
            return Err(e.into());
        }
    };

    if player_id.is_blank() {
        send_error(conn, &state.codec, 400, "player_id must not be blank")
            .await?;
        return Err(ProtocolError::InvalidMessage("blank player_id".into()).into());
    }

    Ok(player_id)
}

/// Spawns the task that moves queued frames onto the socket.
///
/// A write that fails or exceeds the send timeout ends the task. Its
/// receiver is then dropped, so the next broadcast to this player finds
/// the queue closed and marks them offline.
fn spawn_writer(
    conn: Arc<WebSocketConnection>,
    mut rx: mpsc::Receiver<Frame>,
    settings: ConnectionSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let conn_id = conn.id();
        while let Some(frame) = rx.recv().await {
            match tokio::time::timeout(settings.send_timeout, conn.send(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
                    break;
                }
                Err(_) => {
                    tracing::warn!(%conn_id, "send timed out, stopping writer");
                    break;
                }
            }
        }
        if let Err(e) = conn.close().await {
            tracing::debug!(%conn_id, error = %e, "close failed");
        }
    })
}

/// A registered connection: who it speaks for and where replies go.
struct Session<C: Codec> {
    conn_id: ConnectionId,
    player_id: PlayerId,
    tx: PlayerSender,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Session<C> {
    /// Queues one event behind anything already waiting for this client.
    async fn reply(&self, event: &ServerEvent) -> Result<(), DuelError> {
        let bytes = self.state.codec.encode(event)?;
        self.tx
            .send(Frame::from(bytes))
            .await
            .map_err(|_| TransportError::ConnectionClosed(self.conn_id.to_string()))?;
        Ok(())
    }

    async fn error(&self, code: u16, message: &str) -> Result<(), DuelError> {
        self.reply(&ServerEvent::Error {
            code,
            message: message.to_string(),
        })
        .await
    }

    /// Runs one command against the coordinator and replies.
    async fn dispatch(&self, command: Command) -> Result<(), DuelError> {
        let coordinator = Arc::clone(&self.state.coordinator);
        let player_id = self.player_id.clone();
        tracing::debug!(%player_id, command = command.kind(), "command received");

        let event = match command {
            Command::Register { player_id: requested } => {
                if requested != player_id {
                    return self
                        .error(409, &format!("connection already registered as {player_id}"))
                        .await;
                }
                ServerEvent::Registered { player_id }
            }

            Command::CreateRoom => {
                let room_id = coordinator.create_room(player_id).await;
                self.reply(&ServerEvent::RoomCreated {
                    room_id: room_id.clone(),
                })
                .await?;
                coordinator.broadcast(&room_id).await;
                return Ok(());
            }

            Command::JoinRoom { room_id } => {
                match coordinator.join_room(player_id, &room_id).await {
                    Ok(room_id) => ServerEvent::JoinResult {
                        success: true,
                        room_id: Some(room_id),
                    },
                    Err(_) => ServerEvent::JoinResult {
                        success: false,
                        room_id: None,
                    },
                }
            }

            Command::LeaveRoom => ServerEvent::LeaveResult {
                success: coordinator.leave_room(&player_id).await.is_ok(),
            },

            Command::StartGame => {
                let result = coordinator.start_game(&player_id).await;
                if let Err(e) = &result {
                    tracing::debug!(%player_id, error = %e, "start rejected");
                }
                ServerEvent::StartResult {
                    success: result.is_ok(),
                }
            }

            command @ Command::UpdateStats { .. } => {
                let stats = command.stats().unwrap_or_default();
                ServerEvent::StatsResult {
                    success: coordinator.update_stats(&player_id, stats).await.is_ok(),
                }
            }

            Command::UpdatePlayerName { name } => {
                match coordinator.update_player_name(&player_id, &name).await {
                    Ok(name) => ServerEvent::NameResult {
                        success: true,
                        name: Some(name),
                    },
                    Err(_) => ServerEvent::NameResult {
                        success: false,
                        name: None,
                    },
                }
            }

            Command::RestartGame => ServerEvent::RestartResult {
                success: coordinator.restart_game(&player_id).await.is_ok(),
            },

            Command::Heartbeat => ServerEvent::HeartbeatAck {
                server_time: coordinator.heartbeat(&player_id).await,
            },

            Command::GetRoomStatus { room_id } => {
                match coordinator.room_status(&room_id).await {
                    Ok(snapshot) => ServerEvent::RoomStatus {
                        success: true,
                        data: Some(snapshot),
                    },
                    Err(_) => ServerEvent::RoomStatus {
                        success: false,
                        data: None,
                    },
                }
            }
        };

        self.reply(&event).await
    }
}

/// Sends an `error` event straight to the socket. Used before the
/// outbound queue exists.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    code: u16,
    message: &str,
) -> Result<(), DuelError> {
    let bytes = codec.encode(&ServerEvent::Error {
        code,
        message: message.to_string(),
    })?;
    conn.send(&bytes).await.map_err(DuelError::Transport)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_from_path() {
        assert_eq!(room_from_path("/room/k3x9qa"), Some(RoomId::from("k3x9qa")));
        assert_eq!(room_from_path("/room/extra/k3x9qa"), Some(RoomId::from("k3x9qa")));
    }

    #[test]
    fn test_room_from_path_ignores_other_paths() {
        assert_eq!(room_from_path("/"), None);
        assert_eq!(room_from_path("/room/"), None);
        assert_eq!(room_from_path("/rooms/k3x9qa"), None);
        assert_eq!(room_from_path("/room"), None);
    }
}
