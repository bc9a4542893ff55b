//! Session Module - Call-Lifecycle für die UI
//!
//! Dieses Modul verwaltet:
//! - Lokale Medien (Vorbereitung, Mute, Freigabe)
//! - Rollen-Auflösung über den Raum (erster Teilnehmer ruft an)
//! - Call-Events für den UI-Kollaborator

mod controller;
mod events;

pub use controller::CallSessionController;
pub use events::{CallError, CallEvent};
