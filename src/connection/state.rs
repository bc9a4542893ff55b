//! Verbindungszustand einer Peer Connection

use serde::{Deserialize, Serialize};

/// Zustand des Offer/Answer-Automaten
///
/// `Failed` und `Closed` sind terminal: aus ihnen führt nur noch ein
/// expliziter `close()` nach `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    /// Medienpfad steht oder stand bereits (Unterbrechung kann sich erholen)
    pub fn is_established(self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::New
    }
}
