//! In-Memory Signaling Backend
//!
//! Beide Teilnehmer laufen im selben Prozess (Tests, Demos). Zustellung
//! erfolgt synchron über die [`RoomRegistry`].

use super::channel::{ChannelHandle, JoinError, OutboundSink, SendError, SignalingChannel};
use super::messages::{RoomId, SignalingMessage};
use super::rooms::{ParticipantId, RoomRegistry};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct MemorySignaling {
    registry: RoomRegistry,
    reachable: Arc<AtomicBool>,
    join_attempts: Arc<AtomicUsize>,
}

impl MemorySignaling {
    pub fn new() -> Self {
        Self {
            registry: RoomRegistry::new(),
            reachable: Arc::new(AtomicBool::new(true)),
            join_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Simuliert einen nicht erreichbaren Signaling-Dienst
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Anzahl der `join`-Aufrufe (auch fehlgeschlagene)
    pub fn join_attempts(&self) -> usize {
        self.join_attempts.load(Ordering::SeqCst)
    }

    /// Trennt alle Teilnehmer hart, ohne `Bye`
    pub fn shutdown(&self) {
        self.registry.clear();
    }
}

impl Default for MemorySignaling {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalingChannel for MemorySignaling {
    async fn join(&self, room_id: &RoomId) -> Result<ChannelHandle, JoinError> {
        self.join_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(JoinError::Unreachable(
                "in-memory signaling is offline".to_string(),
            ));
        }

        let membership = self.registry.join(room_id)?;
        let sink = MemorySink {
            registry: self.registry.clone(),
            room_id: room_id.clone(),
            participant_id: membership.participant_id,
        };

        Ok(ChannelHandle::new(
            room_id.clone(),
            membership.role,
            Box::new(sink),
            membership.inbox,
        ))
    }
}

struct MemorySink {
    registry: RoomRegistry,
    room_id: RoomId,
    participant_id: ParticipantId,
}

impl OutboundSink for MemorySink {
    fn send(&self, message: SignalingMessage) -> Result<(), SendError> {
        if self
            .registry
            .deliver(&self.room_id, self.participant_id, message)
        {
            Ok(())
        } else {
            Err(SendError::ChannelClosed)
        }
    }

    fn leave(&self) {
        self.registry.leave(&self.room_id, self.participant_id);
    }
}
