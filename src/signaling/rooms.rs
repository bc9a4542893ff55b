//! Raum-Verwaltung mit zwei Plätzen pro Raum
//!
//! Wird vom In-Memory Backend und vom WebSocket-Relay gemeinsam genutzt.
//! Nachrichten an einen noch leeren Platz werden gepuffert und beim Beitritt
//! des zweiten Teilnehmers in Reihenfolge zugestellt.

use super::channel::JoinError;
use super::messages::{Role, RoomId, SignalingMessage};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Maximale Teilnehmer pro Raum
pub const ROOM_CAPACITY: usize = 2;

pub type ParticipantId = Uuid;

struct Participant {
    id: ParticipantId,
    role: Role,
    inbox: mpsc::UnboundedSender<SignalingMessage>,
    said_bye: bool,
}

#[derive(Default)]
struct Room {
    participants: Vec<Participant>,
    /// Nachrichten des einzelnen Teilnehmers, solange der zweite fehlt
    pending: VecDeque<SignalingMessage>,
}

/// Ergebnis eines erfolgreichen Beitritts
#[derive(Debug)]
pub struct Membership {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub inbox: mpsc::UnboundedReceiver<SignalingMessage>,
}

#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<RoomId, Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Belegt einen Platz im Raum (legt ihn bei Bedarf an)
    pub fn join(&self, room_id: &RoomId) -> Result<Membership, JoinError> {
        let mut rooms = self.rooms.lock();

        if rooms
            .get(room_id)
            .is_some_and(|room| room.participants.len() >= ROOM_CAPACITY)
        {
            tracing::warn!("Rejected join: room {} is full", room_id);
            return Err(JoinError::RoomFull);
        }

        let room = rooms.entry(room_id.clone()).or_default();
        // Freier Platz bestimmt die Rolle, nicht die Beitrittsreihenfolge
        let role = if room.participants.iter().any(|p| p.role == Role::Caller) {
            Role::Callee
        } else {
            Role::Caller
        };

        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        for message in room.pending.drain(..) {
            let _ = inbox_tx.send(message);
        }

        let participant_id = Uuid::new_v4();
        room.participants.push(Participant {
            id: participant_id,
            role,
            inbox: inbox_tx,
            said_bye: false,
        });

        tracing::info!(
            "Participant {} joined room {} as {:?}",
            participant_id,
            room_id,
            role
        );

        Ok(Membership {
            participant_id,
            role,
            inbox,
        })
    }

    /// Stellt eine Nachricht an den anderen Teilnehmer zu
    ///
    /// Gibt `false` zurück, wenn der Absender nicht (mehr) im Raum ist.
    pub fn deliver(
        &self,
        room_id: &RoomId,
        from: ParticipantId,
        message: SignalingMessage,
    ) -> bool {
        let mut rooms = self.rooms.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return false;
        };

        let Some(sender) = room.participants.iter_mut().find(|p| p.id == from) else {
            return false;
        };
        if message == SignalingMessage::Bye {
            sender.said_bye = true;
        }

        match room.participants.iter().find(|p| p.id != from) {
            Some(peer) => {
                if peer.inbox.send(message).is_err() {
                    tracing::debug!("Peer {} in room {} stopped reading", peer.id, room_id);
                }
            }
            None => room.pending.push_back(message),
        }
        true
    }

    /// Gibt den Platz frei; ein leerer Raum wird entfernt
    ///
    /// Hat der Teilnehmer kein `Bye` gesendet, bekommt der verbleibende Peer
    /// stellvertretend eines.
    pub fn leave(&self, room_id: &RoomId, participant_id: ParticipantId) {
        let mut rooms = self.rooms.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };

        let Some(index) = room.participants.iter().position(|p| p.id == participant_id) else {
            return;
        };
        let leaving = room.participants.remove(index);

        // Gepufferte Nachrichten stammen immer vom einzigen Teilnehmer
        room.pending.clear();

        if !leaving.said_bye {
            for peer in &room.participants {
                let _ = peer.inbox.send(SignalingMessage::Bye);
            }
        }

        tracing::info!(
            "Participant {} ({:?}) left room {}",
            participant_id,
            leaving.role,
            room_id
        );

        if room.participants.is_empty() {
            rooms.remove(room_id);
            tracing::info!("Room {} destroyed", room_id);
        }
    }

    /// Anzahl Teilnehmer in einem Raum
    pub fn occupancy(&self, room_id: &RoomId) -> usize {
        self.rooms
            .lock()
            .get(room_id)
            .map(|room| room.participants.len())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Entfernt alle Räume; offene Handles sehen danach einen geschlossenen Kanal
    pub fn clear(&self) {
        self.rooms.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(sdp: &str) -> SignalingMessage {
        SignalingMessage::Offer {
            sdp: sdp.to_string(),
        }
    }

    #[test]
    fn test_first_joiner_is_caller() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");

        let a = registry.join(&room).unwrap();
        let b = registry.join(&room).unwrap();

        assert_eq!(a.role, Role::Caller);
        assert_eq!(b.role, Role::Callee);
        assert_eq!(registry.occupancy(&room), 2);
    }

    #[test]
    fn test_rejoin_takes_the_free_slot() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");

        let a = registry.join(&room).unwrap();
        let b = registry.join(&room).unwrap();

        // Caller geht, der Callee bleibt
        registry.leave(&room, a.participant_id);
        let c = registry.join(&room).unwrap();
        assert_eq!(b.role, Role::Callee);
        assert_eq!(c.role, Role::Caller);

        // Jetzt geht der Callee, der Nächste übernimmt seinen Platz
        registry.leave(&room, b.participant_id);
        let d = registry.join(&room).unwrap();
        assert_eq!(d.role, Role::Callee);
        assert_eq!(registry.occupancy(&room), 2);
        assert_eq!(registry.join(&room).unwrap_err(), JoinError::RoomFull);
    }

    #[test]
    fn test_third_joiner_is_rejected() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");

        let _a = registry.join(&room).unwrap();
        let _b = registry.join(&room).unwrap();

        assert_eq!(registry.join(&room).unwrap_err(), JoinError::RoomFull);
        assert_eq!(registry.occupancy(&room), 2);
    }

    #[test]
    fn test_pending_messages_flushed_in_order() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");

        let a = registry.join(&room).unwrap();
        assert!(registry.deliver(&room, a.participant_id, offer("1")));
        assert!(registry.deliver(&room, a.participant_id, offer("2")));

        let mut b = registry.join(&room).unwrap();
        assert_eq!(b.inbox.try_recv().unwrap(), offer("1"));
        assert_eq!(b.inbox.try_recv().unwrap(), offer("2"));
        assert!(b.inbox.try_recv().is_err());
    }

    #[test]
    fn test_leave_notifies_peer_and_destroys_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");

        let a = registry.join(&room).unwrap();
        let mut b = registry.join(&room).unwrap();

        registry.leave(&room, a.participant_id);
        assert_eq!(b.inbox.try_recv().unwrap(), SignalingMessage::Bye);
        assert_eq!(registry.occupancy(&room), 1);

        registry.leave(&room, b.participant_id);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_explicit_bye_is_not_duplicated() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");

        let a = registry.join(&room).unwrap();
        let mut b = registry.join(&room).unwrap();

        registry.deliver(&room, a.participant_id, SignalingMessage::Bye);
        registry.leave(&room, a.participant_id);

        assert_eq!(b.inbox.try_recv().unwrap(), SignalingMessage::Bye);
        assert!(b.inbox.try_recv().is_err());
    }

    #[test]
    fn test_deliver_from_unknown_participant() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");
        let _a = registry.join(&room).unwrap();

        assert!(!registry.deliver(&room, Uuid::new_v4(), SignalingMessage::Bye));
        assert!(!registry.deliver(
            &RoomId::from("missing"),
            Uuid::new_v4(),
            SignalingMessage::Bye
        ));
    }
}
