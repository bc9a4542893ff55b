//! P2P Audio - Raum-basierte Peer-to-Peer Audio-Calls
//!
//! Vervollständigt das Browser-Demo "Peer to Peer Audio" zu einem echten
//! System:
//! - Signaling über Räume mit genau zwei Plätzen (WebSocket-Relay oder In-Memory)
//! - Connection Coordinator mit Offer/Answer-Zustandsautomat und ICE-Queue
//! - Call Session Controller für Mikrofon, Rollen und Call-Lifecycle
//!
//! Wer einen Raum zuerst betritt, ist Caller und sendet das Offer. Der zweite
//! Teilnehmer beantwortet es automatisch.

pub mod config;
pub mod connection;
pub mod media;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod testing;

pub use config::{CallConfig, ConfigError, IceServerConfig, RelayConfig, RtcConfiguration};
pub use connection::{ConnectionCoordinator, ConnectionState, NegotiationError};
pub use media::{LocalMediaHandle, MediaConstraints, MediaError, MediaSource};
pub use session::{CallError, CallEvent, CallSessionController};
pub use signaling::{
    ChannelHandle, JoinError, Role, RoomId, SendError, SignalingChannel, SignalingMessage,
};

use tracing_subscriber::EnvFilter;

/// Standard-Filter wenn `RUST_LOG` nicht gesetzt ist
const DEFAULT_LOG_FILTER: &str = "p2p_audio=debug,webrtc=warn";

/// Initialisiert das Logging (mehrfacher Aufruf ist unschädlich)
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
