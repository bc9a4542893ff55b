//! Connection Coordinator
//!
//! Einzige Quelle der Wahrheit für den Verhandlungszustand einer Peer
//! Connection. Alle Methoden nehmen `&mut self`: Signaling- und
//! Transport-Ereignisse einer Session werden nacheinander verarbeitet.
//!
//! ```text
//! New ──create_offer──▶ HaveLocalOffer ──apply_answer──▶ Connecting
//! New ──apply_offer───▶ HaveRemoteOffer ─create_answer─▶ Connecting
//! Connecting ◀──▶ Connected ◀──▶ Disconnected
//! nicht-terminal ──▶ Failed,  jeder Zustand ──close──▶ Closed
//! ```

use super::pending::PendingCandidateQueue;
use super::state::ConnectionState;
use super::transport::{
    PeerTransport, SessionDescription, TransportError, TransportEvent, TransportState,
};
use crate::media::LocalTrack;
use crate::signaling::{IceCandidate, SignalingMessage};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Session description rejected: {0}")]
    DescriptionRejected(String),

    #[error("Cannot {action} in state {from:?}")]
    InvalidStateTransition {
        from: ConnectionState,
        action: &'static str,
    },

    #[error("Timed out during {0}")]
    Timeout(&'static str),

    #[error("Connection failed")]
    ConnectionFailed,

    #[error(transparent)]
    Transport(TransportError),
}

impl NegotiationError {
    /// Fatale Fehler beenden die Verbindung mit `Failed`
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidStateTransition { .. })
    }
}

impl From<TransportError> for NegotiationError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidDescription(reason) => Self::DescriptionRejected(reason),
            other => Self::Transport(other),
        }
    }
}

/// Beobachter für Zustandswechsel
pub type StateObserver = Box<dyn Fn(ConnectionState) + Send + Sync>;

// ============================================================================
// CONNECTION COORDINATOR
// ============================================================================

pub struct ConnectionCoordinator {
    transport: Box<dyn PeerTransport>,
    state: ConnectionState,
    has_remote_description: bool,
    pending: PendingCandidateQueue,
    step_timeout: Duration,
    transport_closed: bool,
    observer: Option<StateObserver>,
}

impl ConnectionCoordinator {
    /// `step_timeout` begrenzt jeden asynchronen Schritt der Transportschicht
    pub fn new(transport: Box<dyn PeerTransport>, step_timeout: Duration) -> Self {
        Self {
            transport,
            state: ConnectionState::New,
            has_remote_description: false,
            pending: PendingCandidateQueue::new(),
            step_timeout,
            transport_closed: false,
            observer: None,
        }
    }

    pub fn on_state_change(&mut self, observer: StateObserver) {
        self.observer = Some(observer);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn has_remote_description(&self) -> bool {
        self.has_remote_description
    }

    /// Anzahl gepufferter Remote Candidates
    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub async fn add_local_track(&mut self, track: &LocalTrack) -> Result<(), NegotiationError> {
        self.require(|s| !s.is_terminal(), "add a local track")?;

        let result = bounded(
            self.step_timeout,
            "add local track",
            self.transport.add_local_track(track),
        )
        .await;
        self.escalate(result)?;

        tracing::debug!("Attached local {:?} track {}", track.kind, track.id);
        Ok(())
    }

    /// New → HaveLocalOffer; liefert das zu sendende Offer
    pub async fn create_offer(&mut self) -> Result<SignalingMessage, NegotiationError> {
        self.require(|s| s == ConnectionState::New, "create an offer")?;

        let result = bounded(
            self.step_timeout,
            "create offer",
            self.transport.create_offer(),
        )
        .await;
        let offer = self.escalate(result)?;

        let result = bounded(
            self.step_timeout,
            "set local offer",
            self.transport.set_local_description(offer.clone()),
        )
        .await;
        self.escalate(result)?;

        self.set_state(ConnectionState::HaveLocalOffer);
        Ok(SignalingMessage::Offer { sdp: offer.sdp })
    }

    /// New → HaveRemoteOffer
    pub async fn apply_offer(&mut self, sdp: String) -> Result<(), NegotiationError> {
        self.require(|s| s == ConnectionState::New, "apply a remote offer")?;

        self.apply_remote_description(SessionDescription::offer(sdp), "set remote offer")
            .await?;

        self.set_state(ConnectionState::HaveRemoteOffer);
        Ok(())
    }

    /// HaveRemoteOffer → Connecting; liefert die zu sendende Answer
    pub async fn create_answer(&mut self) -> Result<SignalingMessage, NegotiationError> {
        self.require(|s| s == ConnectionState::HaveRemoteOffer, "create an answer")?;

        let result = bounded(
            self.step_timeout,
            "create answer",
            self.transport.create_answer(),
        )
        .await;
        let answer = self.escalate(result)?;

        let result = bounded(
            self.step_timeout,
            "set local answer",
            self.transport.set_local_description(answer.clone()),
        )
        .await;
        self.escalate(result)?;

        self.set_state(ConnectionState::Connecting);
        Ok(SignalingMessage::Answer { sdp: answer.sdp })
    }

    /// HaveLocalOffer → Connecting
    pub async fn apply_answer(&mut self, sdp: String) -> Result<(), NegotiationError> {
        self.require(|s| s == ConnectionState::HaveLocalOffer, "apply a remote answer")?;

        self.apply_remote_description(SessionDescription::answer(sdp), "set remote answer")
            .await?;

        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    /// Wendet einen Remote Candidate an oder puffert ihn
    ///
    /// Ein vom Transport abgelehnter Candidate wird verworfen, ohne die
    /// Verbindung zu gefährden.
    pub async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        if self.state.is_terminal() {
            tracing::debug!("Ignoring remote candidate in state {:?}", self.state);
            return Ok(());
        }

        if !self.has_remote_description {
            self.pending.push(candidate);
            tracing::debug!(
                "Queued remote candidate ({} pending)",
                self.pending.len()
            );
            return Ok(());
        }

        self.apply_candidate(candidate).await
    }

    /// Leitet einen Mikrofon-Frame an die Transportschicht weiter
    ///
    /// Nach Close oder Failed wird der Frame verworfen. Ein Fehler beim
    /// Senden ändert den Zustand nicht.
    pub async fn send_audio_frame(&self, frame: &[f32]) -> Result<(), NegotiationError> {
        if self.state.is_terminal() {
            return Ok(());
        }

        bounded(
            self.step_timeout,
            "write audio frame",
            self.transport.write_audio_frame(frame),
        )
        .await
    }

    /// Übersetzt ein Transport-Ereignis
    ///
    /// Liefert eine Nachricht, wenn sie an den Peer gehen muss (lokale
    /// Candidates). `Err(ConnectionFailed)` signalisiert einen terminalen
    /// Transportfehler.
    pub fn handle_transport_event(
        &mut self,
        event: TransportEvent,
    ) -> Result<Option<SignalingMessage>, NegotiationError> {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if self.state == ConnectionState::Closed {
                    return Ok(None);
                }
                Ok(Some(SignalingMessage::IceCandidate(candidate)))
            }
            TransportEvent::StateChanged(state) => {
                self.apply_transport_state(state)?;
                Ok(None)
            }
            TransportEvent::RemoteTrack(track) => {
                tracing::debug!("Remote {:?} track {} ({})", track.kind, track.id, track.codec);
                Ok(None)
            }
        }
    }

    /// Expliziter lokaler Abbau → Closed (idempotent)
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.close_transport().await;
        self.pending.clear();
        self.set_state(ConnectionState::Closed);
    }

    /// Abbruch nach einem Fehler: Transport schließen, Zustand `Failed`
    pub async fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.set_state(ConnectionState::Failed);
        }
        self.pending.clear();
        self.close_transport().await;
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    async fn apply_remote_description(
        &mut self,
        description: SessionDescription,
        step: &'static str,
    ) -> Result<(), NegotiationError> {
        let result = bounded(
            self.step_timeout,
            step,
            self.transport.set_remote_description(description),
        )
        .await;
        self.escalate(result)?;
        self.has_remote_description = true;

        self.drain_pending().await
    }

    /// Gepufferte Candidates in Empfangsreihenfolge anwenden
    async fn drain_pending(&mut self) -> Result<(), NegotiationError> {
        if !self.pending.is_empty() {
            tracing::debug!("Applying {} queued remote candidate(s)", self.pending.len());
        }

        while let Some(candidate) = self.pending.pop() {
            self.apply_candidate(candidate).await?;
        }
        Ok(())
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let result = bounded(
            self.step_timeout,
            "add ICE candidate",
            self.transport.add_ice_candidate(candidate),
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(NegotiationError::Transport(TransportError::InvalidCandidate(reason))) => {
                tracing::warn!("Skipping rejected remote candidate: {}", reason);
                Ok(())
            }
            Err(e) => self.escalate(Err(e)),
        }
    }

    fn apply_transport_state(&mut self, reported: TransportState) -> Result<(), NegotiationError> {
        use ConnectionState::*;

        let next = match (self.state, reported) {
            (Connecting | Disconnected, TransportState::Connected) => Some(Connected),
            (current, TransportState::Disconnected) if !current.is_terminal() => Some(Disconnected),
            (current, TransportState::Failed) if !current.is_terminal() => {
                tracing::error!("Transport failed in state {:?}", current);
                self.set_state(Failed);
                return Err(NegotiationError::ConnectionFailed);
            }
            (current, TransportState::Closed) if !current.is_terminal() => Some(Closed),
            _ => None,
        };

        match next {
            Some(next) if next != self.state => self.set_state(next),
            Some(_) => {}
            None => tracing::debug!(
                "Transport reported {:?} in state {:?}, no transition",
                reported,
                self.state
            ),
        }
        Ok(())
    }

    async fn close_transport(&mut self) {
        if self.transport_closed {
            return;
        }
        self.transport_closed = true;

        match bounded(self.step_timeout, "close", self.transport.close()).await {
            Ok(()) => tracing::debug!("Peer connection closed"),
            Err(e) => tracing::warn!("Error closing peer connection: {}", e),
        }
    }

    fn require(
        &self,
        allowed: impl Fn(ConnectionState) -> bool,
        action: &'static str,
    ) -> Result<(), NegotiationError> {
        if allowed(self.state) {
            Ok(())
        } else {
            Err(NegotiationError::InvalidStateTransition {
                from: self.state,
                action,
            })
        }
    }

    /// Fatale Fehler treiben den Zustand nach `Failed`
    fn escalate<T>(&mut self, result: Result<T, NegotiationError>) -> Result<T, NegotiationError> {
        if let Err(e) = &result {
            if e.is_fatal() && !self.state.is_terminal() {
                tracing::error!("Negotiation failed: {}", e);
                self.set_state(ConnectionState::Failed);
            }
        }
        result
    }

    fn set_state(&mut self, next: ConnectionState) {
        tracing::info!("Connection state: {:?} -> {:?}", self.state, next);
        self.state = next;
        if let Some(observer) = &self.observer {
            observer(next);
        }
    }
}

impl std::fmt::Debug for ConnectionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCoordinator")
            .field("state", &self.state)
            .field("has_remote_description", &self.has_remote_description)
            .field("pending", &self.pending.len())
            .finish()
    }
}

async fn bounded<T>(
    limit: Duration,
    step: &'static str,
    operation: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, NegotiationError> {
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(NegotiationError::from),
        Err(_) => Err(NegotiationError::Timeout(step)),
    }
}
