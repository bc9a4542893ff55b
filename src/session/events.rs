//! Fehler und Ereignisse einer Call-Session

use crate::connection::{ConnectionState, NegotiationError, RemoteTrackInfo};
use crate::media::MediaError;
use crate::signaling::{JoinError, Role, RoomId, SendError};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("Local media not prepared")]
    MediaNotReady,

    #[error("Already in a call")]
    AlreadyInCall,

    #[error("Signaling channel lost before the call was established")]
    SignalingLost,

    #[error("Call was ended while it was being set up")]
    Cancelled,

    #[error("No previous call to restart")]
    NoPreviousRoom,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Events für den UI-Kollaborator
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// Raum betreten, Rolle steht fest
    Joined { room_id: RoomId, role: Role },
    StateChanged(ConnectionState),
    RemoteTrack(RemoteTrackInfo),
    /// Der Peer hat aufgelegt
    RemoteHangup,
    /// Einheitliches "Call fehlgeschlagen" samt Ursache
    CallFailed(CallError),
    /// Session vollständig abgebaut, lokale Medien freigegeben
    Ended,
}
