//! Message Types für das Signaling-Protokoll
//!
//! Auf dem Draht ist jede Nachricht ein JSON-Objekt
//! `{ "type": ..., "roomId": ..., "payload": { ... } }`.
//! Intern wird mit dem typsicheren [`SignalingMessage`] gearbeitet.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Raum-Kennung, die beide Teilnehmer out-of-band austauschen
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rolle im Raum: wer zuerst beitritt, ruft an
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Caller,
    Callee,
}

// ============================================================================
// SIGNALING MESSAGES
// ============================================================================

/// ICE Candidate wie er zwischen den Peers ausgetauscht wird
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mline_index: Some(0),
            sdp_mid: Some("0".to_string()),
        }
    }
}

/// Alle Nachrichten, die zwischen zwei Teilnehmern eines Raums fließen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate(IceCandidate),
    Bye,
}

impl SignalingMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Offer { .. } => MessageKind::Offer,
            Self::Answer { .. } => MessageKind::Answer,
            Self::IceCandidate(_) => MessageKind::Candidate,
            Self::Bye => MessageKind::Bye,
        }
    }

    /// Verpackt die Nachricht in den Wire-Envelope
    pub fn to_envelope(&self, room_id: &RoomId) -> Envelope {
        let payload = match self {
            Self::Offer { sdp } | Self::Answer { sdp } => serde_json::json!({ "sdp": sdp }),
            Self::IceCandidate(candidate) => {
                serde_json::to_value(candidate).unwrap_or(Value::Null)
            }
            Self::Bye => serde_json::json!({}),
        };

        Envelope {
            kind: self.kind(),
            room_id: room_id.clone(),
            payload,
        }
    }
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

/// Wert des `type`-Feldes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Offer,
    Answer,
    Candidate,
    Bye,
    /// Client → Relay: Raum betreten
    Join,
    /// Relay → Client: Beitritt bestätigt, Payload enthält die Rolle
    Joined,
    /// Relay → Client: Raum hat bereits zwei Teilnehmer
    RoomFull,
    /// Relay → Client: Protokollfehler
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Deserialize)]
struct SdpPayload {
    sdp: String,
}

#[derive(Serialize, Deserialize)]
struct JoinedPayload {
    role: Role,
}

#[derive(Serialize, Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Fehler beim Interpretieren eines Envelopes
#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unexpected message type: {0:?}")]
    UnexpectedKind(MessageKind),
}

impl Envelope {
    pub fn join(room_id: &RoomId) -> Self {
        Self::control(MessageKind::Join, room_id, serde_json::json!({}))
    }

    pub fn joined(room_id: &RoomId, role: Role) -> Self {
        let payload = serde_json::to_value(JoinedPayload { role }).unwrap_or(Value::Null);
        Self::control(MessageKind::Joined, room_id, payload)
    }

    pub fn room_full(room_id: &RoomId) -> Self {
        Self::control(MessageKind::RoomFull, room_id, serde_json::json!({}))
    }

    pub fn error(room_id: &RoomId, message: impl Into<String>) -> Self {
        let payload = serde_json::to_value(ErrorPayload {
            message: message.into(),
        })
        .unwrap_or(Value::Null);
        Self::control(MessageKind::Error, room_id, payload)
    }

    fn control(kind: MessageKind, room_id: &RoomId, payload: Value) -> Self {
        Self {
            kind,
            room_id: room_id.clone(),
            payload,
        }
    }

    pub fn parse(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wandelt einen Peer-Envelope in eine [`SignalingMessage`] um
    pub fn into_message(self) -> Result<SignalingMessage, WireError> {
        match self.kind {
            MessageKind::Offer => {
                let SdpPayload { sdp } = serde_json::from_value(self.payload)?;
                Ok(SignalingMessage::Offer { sdp })
            }
            MessageKind::Answer => {
                let SdpPayload { sdp } = serde_json::from_value(self.payload)?;
                Ok(SignalingMessage::Answer { sdp })
            }
            MessageKind::Candidate => Ok(SignalingMessage::IceCandidate(serde_json::from_value(
                self.payload,
            )?)),
            MessageKind::Bye => Ok(SignalingMessage::Bye),
            other => Err(WireError::UnexpectedKind(other)),
        }
    }

    /// Rolle aus einer `joined`-Bestätigung
    pub fn joined_role(&self) -> Result<Role, WireError> {
        if self.kind != MessageKind::Joined {
            return Err(WireError::UnexpectedKind(self.kind));
        }
        let JoinedPayload { role } = serde_json::from_value(self.payload.clone())?;
        Ok(role)
    }

    pub fn error_message(&self) -> Option<String> {
        serde_json::from_value::<ErrorPayload>(self.payload.clone())
            .ok()
            .map(|p| p.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_envelope_shape() {
        let room = RoomId::from("r1");
        let envelope = SignalingMessage::Offer {
            sdp: "v=0".to_string(),
        }
        .to_envelope(&room);

        let json: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "offer", "roomId": "r1", "payload": {"sdp": "v=0"}})
        );
    }

    #[test]
    fn test_candidate_uses_browser_field_names() {
        let room = RoomId::from("r1");
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".to_string(),
            sdp_mline_index: Some(0),
            sdp_mid: Some("0".to_string()),
        };
        let envelope = SignalingMessage::IceCandidate(candidate.clone()).to_envelope(&room);

        assert_eq!(envelope.payload["sdpMLineIndex"], 0);
        assert_eq!(envelope.payload["sdpMid"], "0");

        let parsed = Envelope::parse(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            parsed.into_message().unwrap(),
            SignalingMessage::IceCandidate(candidate)
        );
    }

    #[test]
    fn test_bye_without_payload() {
        let parsed = Envelope::parse(r#"{"type":"bye","roomId":"r1"}"#).unwrap();
        assert_eq!(parsed.into_message().unwrap(), SignalingMessage::Bye);
    }

    #[test]
    fn test_control_frames() {
        let room = RoomId::from("r1");
        let joined = Envelope::parse(&Envelope::joined(&room, Role::Callee).to_json().unwrap())
            .unwrap();
        assert_eq!(joined.joined_role().unwrap(), Role::Callee);
        assert_eq!(joined.payload["role"], "callee");

        let full = Envelope::room_full(&room);
        assert!(matches!(
            full.into_message(),
            Err(WireError::UnexpectedKind(MessageKind::RoomFull))
        ));

        let error = Envelope::error(&room, "boom");
        assert_eq!(error.error_message().as_deref(), Some("boom"));
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let parsed = Envelope::parse(r#"{"type":"offer","roomId":"r1","payload":{}}"#).unwrap();
        assert!(matches!(parsed.into_message(), Err(WireError::Malformed(_))));
        assert!(Envelope::parse(r#"{"type":"nope","roomId":"r1"}"#).is_err());
    }
}
