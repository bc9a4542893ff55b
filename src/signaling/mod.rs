//! Signaling Module - Nachrichtenaustausch zwischen zwei Teilnehmern
//!
//! Dieses Modul verwaltet:
//! - Wire-Format der Signaling-Nachrichten
//! - Räume mit genau zwei Plätzen
//! - Backends: In-Memory (Tests) und WebSocket (Produktion)

mod channel;
mod client;
mod memory;
mod messages;
pub mod rooms;

pub use channel::{ChannelHandle, JoinError, SendError, SignalingChannel};
pub use client::WebSocketSignaling;
pub use memory::MemorySignaling;
pub use messages::*;
pub use rooms::RoomRegistry;
