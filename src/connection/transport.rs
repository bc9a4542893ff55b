//! Schnittstelle zur Echtzeit-Transportschicht
//!
//! Der Coordinator treibt die Peer Connection nur über [`PeerTransport`].
//! Ereignisse der Verbindung (lokale Candidates, Zustandswechsel, Remote
//! Tracks) kommen als [`TransportEvent`] über einen Kanal zurück.

use crate::config::IceServerConfig;
use crate::media::{LocalTrack, TrackKind};
use crate::signaling::IceCandidate;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("Invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    #[error("WebRTC error: {0}")]
    Rtc(String),

    #[error("Peer connection closed")]
    Closed,
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Zustand, wie ihn die Transportschicht meldet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Eingehender Track des Peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrackInfo {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    StateChanged(TransportState),
    RemoteTrack(RemoteTrackInfo),
}

// ============================================================================
// TRANSPORT TRAITS
// ============================================================================

/// Primitive einer Peer Connection
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_local_track(&self, track: &LocalTrack) -> Result<(), TransportError>;

    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    /// Darf erst nach gesetzter Remote Description aufgerufen werden
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Sendet einen Mikrofon-Frame (Mono PCM @ 48kHz) über die lokalen Audio-Tracks
    ///
    /// Ohne angehängten Audio-Track wird der Frame verworfen.
    async fn write_audio_frame(&self, frame: &[f32]) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Frisch erstellte Verbindung samt Ereigniskanal
pub struct TransportParts {
    pub transport: Box<dyn PeerTransport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Erstellt pro Call eine neue Peer Connection
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
    ) -> Result<TransportParts, TransportError>;
}
