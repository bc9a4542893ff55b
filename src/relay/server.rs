//! WebSocket Relay - Rendezvous-Dienst für den Signaling-Client
//!
//! Protokoll pro Verbindung:
//! 1. Client sendet `join` mit `roomId`
//! 2. Relay antwortet `joined` (mit Rolle) oder `room_full` und schließt
//! 3. Danach werden `offer`/`answer`/`candidate`/`bye` an den Peer weitergeleitet

use crate::signaling::rooms::{Membership, RoomRegistry};
use crate::signaling::{Envelope, JoinError, MessageKind, RoomId, WireError};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite, tungstenite::Message, WebSocketStream};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error(transparent)]
    Wire(#[from] WireError),
}

// ============================================================================
// RELAY SERVER
// ============================================================================

pub struct RelayServer {
    listener: TcpListener,
    registry: RoomRegistry,
}

impl RelayServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            registry: RoomRegistry::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Räume des Relays (z.B. für Monitoring oder Tests)
    pub fn registry(&self) -> RoomRegistry {
        self.registry.clone()
    }

    /// Akzeptiert Verbindungen bis der Listener fehlschlägt
    pub async fn run(self) -> Result<(), RelayError> {
        tracing::info!("Relay listening on {}", self.listener.local_addr()?);

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            let registry = self.registry.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, registry).await {
                    tracing::warn!("Relay connection {} failed: {}", peer_addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: RoomRegistry,
) -> Result<(), RelayError> {
    let mut ws = accept_async(stream).await?;
    tracing::debug!("WebSocket connection from {}", peer_addr);

    let Some(room_id) = read_join(&mut ws).await? else {
        return Ok(());
    };

    let membership = match registry.join(&room_id) {
        Ok(membership) => membership,
        Err(JoinError::RoomFull) => {
            ws.send(Message::Text(Envelope::room_full(&room_id).to_json()?))
                .await?;
            ws.close(None).await?;
            return Ok(());
        }
        Err(e) => {
            ws.send(Message::Text(Envelope::error(&room_id, e.to_string()).to_json()?))
                .await?;
            ws.close(None).await?;
            return Ok(());
        }
    };

    let participant_id = membership.participant_id;
    let result = relay_frames(ws, &room_id, membership, &registry).await;
    registry.leave(&room_id, participant_id);
    tracing::debug!("WebSocket connection from {} closed", peer_addr);
    result
}

/// Erwartet als erstes Frame ein `join`
async fn read_join(ws: &mut WebSocketStream<TcpStream>) -> Result<Option<RoomId>, RelayError> {
    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => {
                let envelope = match Envelope::parse(&text) {
                    Ok(envelope) if envelope.kind == MessageKind::Join => envelope,
                    Ok(envelope) => {
                        let reply = Envelope::error(&envelope.room_id, "expected join");
                        ws.send(Message::Text(reply.to_json()?)).await?;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Invalid frame before join: {}", e);
                        continue;
                    }
                };
                return Ok(Some(envelope.room_id));
            }
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

/// Leitet Frames in beide Richtungen weiter bis eine Seite schließt
async fn relay_frames(
    ws: WebSocketStream<TcpStream>,
    room_id: &RoomId,
    membership: Membership,
    registry: &RoomRegistry,
) -> Result<(), RelayError> {
    let Membership {
        participant_id,
        role,
        mut inbox,
    } = membership;

    let (mut write, mut read) = ws.split();
    write
        .send(Message::Text(Envelope::joined(room_id, role).to_json()?))
        .await?;

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match Envelope::parse(&text) {
                        Ok(envelope) if envelope.room_id != *room_id => {
                            tracing::warn!(
                                "Dropping frame for room {} on connection for room {}",
                                envelope.room_id,
                                room_id
                            );
                        }
                        Ok(envelope) => match envelope.into_message() {
                            Ok(message) => {
                                registry.deliver(room_id, participant_id, message);
                            }
                            Err(e) => tracing::warn!("Unexpected frame in room {}: {}", room_id, e),
                        },
                        Err(e) => tracing::warn!("Invalid frame in room {}: {}", room_id, e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },

            message = inbox.recv() => match message {
                Some(message) => {
                    let text = message.to_envelope(room_id).to_json()?;
                    write.send(Message::Text(text)).await?;
                }
                None => break,
            },
        }
    }

    let _ = write.close().await;
    Ok(())
}
