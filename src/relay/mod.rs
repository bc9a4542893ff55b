//! Relay Module - Signaling-Server für den WebSocket-Client

mod server;

pub use server::{RelayError, RelayServer};
