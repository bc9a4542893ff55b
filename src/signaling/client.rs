//! WebSocket Client für den Signaling-Relay
//!
//! Pro Raum-Beitritt wird eine eigene WebSocket-Verbindung aufgebaut:
//! - `join` senden und auf `joined` / `room_full` warten
//! - Read-Task wandelt Envelopes in [`SignalingMessage`]s um
//! - Write-Task serialisiert ausgehende Nachrichten in Sendereihenfolge

use super::channel::{ChannelHandle, JoinError, OutboundSink, SendError, SignalingChannel};
use super::messages::{Envelope, MessageKind, Role, RoomId, SignalingMessage};
use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

/// Wartezeit auf die Beitrittsbestätigung des Relays
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

enum WriteCommand {
    Send(String),
    Close,
}

// ============================================================================
// WEBSOCKET SIGNALING
// ============================================================================

/// Produktions-Backend: spricht mit dem Relay über WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketSignaling {
    server_url: String,
    join_timeout: Duration,
}

impl WebSocketSignaling {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            join_timeout: JOIN_TIMEOUT,
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Liest Frames bis zur Beitrittsbestätigung
    async fn await_joined<S>(read: &mut S, room_id: &RoomId) -> Result<Role, JoinError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let envelope = Envelope::parse(&text)
                        .map_err(|e| JoinError::Unreachable(e.to_string()))?;

                    match envelope.kind {
                        MessageKind::Joined => {
                            return envelope
                                .joined_role()
                                .map_err(|e| JoinError::Unreachable(e.to_string()));
                        }
                        MessageKind::RoomFull => return Err(JoinError::RoomFull),
                        MessageKind::Error => {
                            return Err(JoinError::Unreachable(
                                envelope
                                    .error_message()
                                    .unwrap_or_else(|| "relay error".to_string()),
                            ));
                        }
                        other => {
                            tracing::warn!(
                                "Ignoring {:?} before join confirmation for room {}",
                                other,
                                room_id
                            );
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => return Err(JoinError::Unreachable(e.to_string())),
            }
        }

        Err(JoinError::Unreachable(
            "connection closed before join confirmation".to_string(),
        ))
    }
}

#[async_trait]
impl SignalingChannel for WebSocketSignaling {
    async fn join(&self, room_id: &RoomId) -> Result<ChannelHandle, JoinError> {
        tracing::info!("Connecting to signaling server: {}", self.server_url);

        let (ws_stream, _) = connect_async(self.server_url.as_str())
            .await
            .map_err(|e| JoinError::Unreachable(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let join = Envelope::join(room_id)
            .to_json()
            .map_err(|e| JoinError::Unreachable(e.to_string()))?;
        write
            .send(Message::Text(join))
            .await
            .map_err(|e| JoinError::Unreachable(e.to_string()))?;

        let role = tokio::time::timeout(self.join_timeout, Self::await_joined(&mut read, room_id))
            .await
            .map_err(|_| JoinError::Unreachable("timeout waiting for join confirmation".into()))??;

        tracing::info!("Joined room {} as {:?}", room_id, role);

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteCommand>();

        // Read-Task starten
        let read_room = room_id.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match Envelope::parse(&text).and_then(Envelope::into_message) {
                            Ok(message) => {
                                if inbound_tx.send(message).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("Invalid signaling frame: {}", e),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket closed by relay");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            tracing::debug!("Read task for room {} finished", read_room);
        });

        // Write-Task starten
        tokio::spawn(async move {
            while let Some(command) = write_rx.recv().await {
                match command {
                    WriteCommand::Send(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }
                    WriteCommand::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            let _ = write.close().await;
        });

        let sink = WebSocketSink {
            room_id: room_id.clone(),
            tx: write_tx,
        };

        Ok(ChannelHandle::new(
            room_id.clone(),
            role,
            Box::new(sink),
            inbound,
        ))
    }
}

struct WebSocketSink {
    room_id: RoomId,
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl OutboundSink for WebSocketSink {
    fn send(&self, message: SignalingMessage) -> Result<(), SendError> {
        let text = message
            .to_envelope(&self.room_id)
            .to_json()
            .map_err(|_| SendError::ChannelClosed)?;

        self.tx
            .send(WriteCommand::Send(text))
            .map_err(|_| SendError::ChannelClosed)
    }

    fn leave(&self) {
        let _ = self.tx.send(WriteCommand::Close);
    }
}
