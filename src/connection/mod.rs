//! Connection Module - Offer/Answer und ICE für eine Peer Connection
//!
//! Dieses Modul verwaltet:
//! - Zustandsautomat der Verhandlung ([`ConnectionCoordinator`])
//! - Puffer für zu früh eingetroffene ICE Candidates
//! - Abstraktion der Transportschicht und deren WebRTC-Implementierung

mod coordinator;
mod pending;
mod state;
mod transport;
mod webrtc_transport;

pub use coordinator::{ConnectionCoordinator, NegotiationError, StateObserver};
pub use pending::PendingCandidateQueue;
pub use state::ConnectionState;
pub use transport::{
    PeerTransport, RemoteTrackInfo, SdpKind, SessionDescription, TransportError, TransportEvent,
    TransportFactory, TransportParts, TransportState,
};
pub use webrtc_transport::{WebRtcTransport, WebRtcTransportFactory};
