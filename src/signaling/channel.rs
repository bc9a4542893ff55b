//! SignalingChannel - Transport-unabhängige Schnittstelle
//!
//! Ein Backend liefert beim Beitritt ein [`ChannelHandle`]. Das Handle ist
//! für beide Backends gleich, nur die Senke für ausgehende Nachrichten
//! unterscheidet sich.

use super::messages::{Role, RoomId, SignalingMessage};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("Room is full")]
    RoomFull,

    #[error("Signaling service unreachable: {0}")]
    Unreachable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Signaling channel closed")]
    ChannelClosed,
}

// ============================================================================
// BACKEND TRAITS
// ============================================================================

/// Ein Signaling-Backend (In-Memory oder WebSocket)
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Betritt einen Raum. Der erste Teilnehmer erhält [`Role::Caller`], wer
    /// später nachrückt, übernimmt die Rolle des freien Platzes.
    async fn join(&self, room_id: &RoomId) -> Result<ChannelHandle, JoinError>;
}

/// Senke für ausgehende Nachrichten eines Handles
pub(crate) trait OutboundSink: Send + Sync {
    fn send(&self, message: SignalingMessage) -> Result<(), SendError>;

    /// Verlässt den Raum; danach werden keine Nachrichten mehr zugestellt
    fn leave(&self);
}

// ============================================================================
// CHANNEL HANDLE
// ============================================================================

/// Mitgliedschaft in einem Raum
///
/// Eingehende Nachrichten bilden eine einzige, nicht neu startbare Folge:
/// [`ChannelHandle::recv`] liefert `None` erst, wenn der Kanal weg ist.
/// Wird das Handle ohne [`ChannelHandle::close`] gedroppt, verlässt es den
/// Raum trotzdem.
pub struct ChannelHandle {
    room_id: RoomId,
    role: Role,
    sink: Box<dyn OutboundSink>,
    inbound: mpsc::UnboundedReceiver<SignalingMessage>,
    left: bool,
}

impl ChannelHandle {
    pub(crate) fn new(
        room_id: RoomId,
        role: Role,
        sink: Box<dyn OutboundSink>,
        inbound: mpsc::UnboundedReceiver<SignalingMessage>,
    ) -> Self {
        Self {
            room_id,
            role,
            sink,
            inbound,
            left: false,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Sendet eine Nachricht an den anderen Teilnehmer
    pub fn send(&self, message: SignalingMessage) -> Result<(), SendError> {
        tracing::debug!("Signaling -> {:?} in room {}", message.kind(), self.room_id);
        self.sink.send(message)
    }

    /// Nächste eingehende Nachricht
    pub async fn recv(&mut self) -> Option<SignalingMessage> {
        let message = self.inbound.recv().await;
        if let Some(ref message) = message {
            tracing::debug!("Signaling <- {:?} in room {}", message.kind(), self.room_id);
        }
        message
    }

    /// Verlässt den Raum und sendet best-effort ein `Bye`
    pub fn close(mut self) {
        if let Err(e) = self.sink.send(SignalingMessage::Bye) {
            tracing::debug!("Bye not delivered in room {}: {}", self.room_id, e);
        }
        self.leave();
    }

    fn leave(&mut self) {
        if !self.left {
            self.left = true;
            self.sink.leave();
            tracing::info!("Left room {} as {:?}", self.room_id, self.role);
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.leave();
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("room_id", &self.room_id)
            .field("role", &self.role)
            .field("left", &self.left)
            .finish()
    }
}
