//! Call Session Controller
//!
//! Verbindet die Absichten der UI ("Call starten", "Auflegen") mit
//! Signaling, Coordinator und lokalen Medien. Jede Session läuft in einem
//! eigenen Task, der Signaling- und Transport-Ereignisse nacheinander
//! verarbeitet. Der Zustand wird über [`CallEvent`]s veröffentlicht.

use super::events::{CallError, CallEvent};
use crate::config::{CallConfig, ConfigError};
use crate::connection::{
    ConnectionCoordinator, ConnectionState, NegotiationError, TransportError, TransportEvent,
    TransportFactory, WebRtcTransportFactory,
};
use crate::media::{
    LocalMediaHandle, LocalTrack, MediaConstraints, MediaError, MediaSource, MicrophoneSource,
    FRAME_DURATION,
};
use crate::signaling::{
    ChannelHandle, Role, RoomId, SignalingChannel, SignalingMessage, WebSocketSignaling,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Höchstens so viele Frames pro Tick, damit ein Rückstau den Loop nicht blockiert
const MAX_FRAMES_PER_TICK: usize = 5;

// ============================================================================
// SESSION STATE
// ============================================================================

/// Laufende Session; der Slot ist leer, sobald sie beendet wurde
struct ActiveSession {
    id: Uuid,
    room_id: RoomId,
    role: Option<Role>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

/// Zustand, den Controller und Session-Task gemeinsam nutzen
#[derive(Clone)]
struct Shared {
    config: Arc<CallConfig>,
    signaling: Arc<dyn SignalingChannel>,
    transports: Arc<dyn TransportFactory>,
    local_media: Arc<Mutex<Option<LocalMediaHandle>>>,
    state: Arc<Mutex<ConnectionState>>,
    session: Arc<Mutex<Option<ActiveSession>>>,
    event_tx: broadcast::Sender<CallEvent>,
}

impl Shared {
    fn emit(&self, event: CallEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Session ist noch die aktive (nicht beendet oder ersetzt)
    fn is_current(&self, id: Uuid) -> bool {
        self.session.lock().as_ref().is_some_and(|s| s.id == id)
    }

    /// Übernimmt einen Zustand des Coordinators, solange die Session aktiv ist
    fn mirror_state(&self, id: Uuid, next: ConnectionState) {
        if !self.is_current(id) {
            tracing::debug!("Ignoring state {:?} from ended session", next);
            return;
        }

        let changed = {
            let mut state = self.state.lock();
            let changed = *state != next;
            *state = next;
            changed
        };

        if changed {
            self.emit(CallEvent::StateChanged(next));
        }
    }

    /// Gibt die lokalen Medien frei; `true` wenn es etwas freizugeben gab
    fn release_media(&self) -> bool {
        let media = self.local_media.lock().take();
        match media {
            Some(mut media) => {
                media.release();
                true
            }
            None => false,
        }
    }

    /// Holt aufgelaufene Mikrofon-Frames ab
    fn take_audio_frames(&self) -> Vec<Vec<f32>> {
        let media = self.local_media.lock();
        let Some(media) = media.as_ref() else {
            return Vec::new();
        };
        std::iter::from_fn(|| media.read_frame())
            .take(MAX_FRAMES_PER_TICK)
            .collect()
    }

    /// Räumt den Slot, wenn er noch zu dieser Session gehört
    fn finish(&self, id: Uuid) {
        let mut slot = self.session.lock();
        if slot.as_ref().is_some_and(|s| s.id == id) {
            *slot = None;
        }
    }
}

// ============================================================================
// CALL SESSION CONTROLLER
// ============================================================================

pub struct CallSessionController {
    media: Arc<dyn MediaSource>,
    shared: Shared,
    last_room: Mutex<Option<RoomId>>,
}

impl CallSessionController {
    pub fn new(
        config: CallConfig,
        media: Arc<dyn MediaSource>,
        signaling: Arc<dyn SignalingChannel>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            media,
            shared: Shared {
                config: Arc::new(config),
                signaling,
                transports,
                local_media: Arc::new(Mutex::new(None)),
                state: Arc::new(Mutex::new(ConnectionState::New)),
                session: Arc::new(Mutex::new(None)),
                event_tx,
            },
            last_room: Mutex::new(None),
        }
    }

    /// Produktions-Setup: Mikrofon, WebSocket-Relay und WebRTC
    pub fn from_config(config: CallConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let signaling = WebSocketSignaling::new(config.signaling_url.clone());

        Ok(Self::new(
            config,
            Arc::new(MicrophoneSource::new()),
            Arc::new(signaling),
            Arc::new(WebRtcTransportFactory::new()),
        ))
    }

    pub fn config(&self) -> &CallConfig {
        &self.shared.config
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.shared.session.lock().is_some()
    }

    /// Rolle der aktiven Session, sobald der Raum betreten ist
    pub fn role(&self) -> Option<Role> {
        self.shared.session.lock().as_ref().and_then(|s| s.role)
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.shared.session.lock().as_ref().map(|s| s.room_id.clone())
    }

    pub fn has_local_media(&self) -> bool {
        self.shared
            .local_media
            .lock()
            .as_ref()
            .is_some_and(|m| !m.is_released())
    }

    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        self.shared
            .local_media
            .lock()
            .as_ref()
            .map(|m| m.tracks().to_vec())
            .unwrap_or_default()
    }

    pub fn set_muted(&self, muted: bool) {
        if let Some(media) = self.shared.local_media.lock().as_ref() {
            media.set_muted(muted);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.shared
            .local_media
            .lock()
            .as_ref()
            .is_some_and(|m| m.is_muted())
    }

    /// Eingangspegel des Mikrofons (0.0 - 1.0)
    pub fn input_level(&self) -> f32 {
        self.shared
            .local_media
            .lock()
            .as_ref()
            .map(|m| m.input_level())
            .unwrap_or(0.0)
    }

    /// Fordert Mikrofonzugriff an und hält das Handle bis zum Call-Ende
    ///
    /// Sind bereits Medien vorbereitet, werden deren Tracks zurückgegeben.
    pub async fn prepare_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Vec<LocalTrack>, MediaError> {
        if let Some(media) = self.shared.local_media.lock().as_ref() {
            if !media.is_released() {
                return Ok(media.tracks().to_vec());
            }
        }

        tracing::info!("Requesting microphone access");

        let limit = self.shared.config.negotiation_timeout;
        let handle = match tokio::time::timeout(limit, self.media.acquire(constraints)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                tracing::warn!("Microphone access failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                tracing::warn!("Microphone access timed out after {:?}", limit);
                return Err(MediaError::Timeout);
            }
        };

        let tracks = handle.tracks().to_vec();
        let previous = self.shared.local_media.lock().replace(handle);
        drop(previous);

        Ok(tracks)
    }

    /// Betritt den Raum und startet die Verhandlung
    ///
    /// Der erste Teilnehmer sendet sofort ein Offer, der zweite wartet darauf
    /// und antwortet automatisch. Ohne vorbereitete Medien wird der Raum
    /// nicht betreten.
    pub async fn start_call(&self, room_id: impl Into<RoomId>) -> Result<Role, CallError> {
        let room_id = room_id.into();

        let tracks = match self.shared.local_media.lock().as_ref() {
            Some(media) if !media.is_released() => media.tracks().to_vec(),
            _ => return Err(CallError::MediaNotReady),
        };

        let id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut slot = self.shared.session.lock();
            if slot.is_some() {
                return Err(CallError::AlreadyInCall);
            }
            *slot = Some(ActiveSession {
                id,
                room_id: room_id.clone(),
                role: None,
                cancel: cancel_tx,
                task: None,
            });
        }

        *self.last_room.lock() = Some(room_id.clone());
        self.shared.mirror_state(id, ConnectionState::New);
        tracing::info!("Starting call in room {}", room_id);

        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(run_session(
            self.shared.clone(),
            id,
            room_id,
            tracks,
            cancel_rx,
            ready_tx,
        ));

        if let Some(active) = self.shared.session.lock().as_mut().filter(|s| s.id == id) {
            active.task = Some(task);
        }

        ready_rx.await.unwrap_or(Err(CallError::Cancelled))
    }

    /// Beendet den Call und gibt alle Ressourcen frei (idempotent)
    ///
    /// Ein noch laufender asynchroner Schritt wird abgebrochen; sein Ergebnis
    /// verändert die Session nicht mehr.
    pub async fn end_call(&self) {
        let active = self.shared.session.lock().take();
        let had_session = active.is_some();

        if let Some(mut active) = active {
            tracing::info!("Ending call in room {}", active.room_id);
            let _ = active.cancel.send(true);

            if let Some(task) = active.task.take() {
                if let Err(e) = task.await {
                    tracing::warn!("Session task ended abnormally: {}", e);
                }
            }
        }

        let released = self.shared.release_media();

        let closed = {
            let mut state = self.shared.state.lock();
            let close = had_session
                || !matches!(*state, ConnectionState::New | ConnectionState::Closed);
            if close && *state != ConnectionState::Closed {
                *state = ConnectionState::Closed;
                true
            } else {
                false
            }
        };

        if closed {
            self.shared.emit(CallEvent::StateChanged(ConnectionState::Closed));
        }
        if had_session || released || closed {
            self.shared.emit(CallEvent::Ended);
        }
    }

    /// Neuer Versuch im zuletzt genutzten Raum mit frischer Verbindung
    pub async fn restart_call(&self, constraints: &MediaConstraints) -> Result<Role, CallError> {
        let room_id = self
            .last_room
            .lock()
            .clone()
            .ok_or(CallError::NoPreviousRoom)?;

        tracing::info!("Restarting call in room {}", room_id);

        self.end_call().await;
        self.prepare_local_media(constraints).await?;
        self.start_call(room_id).await
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        if let Some(active) = self.shared.session.lock().take() {
            let _ = active.cancel.send(true);
        }
        self.shared.release_media();
    }
}

impl std::fmt::Debug for CallSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionController")
            .field("state", &self.connection_state())
            .field("room_id", &self.room_id())
            .field("is_muted", &self.is_muted())
            .finish()
    }
}

// ============================================================================
// SESSION TASK
// ============================================================================

struct Session {
    channel: ChannelHandle,
    coordinator: ConnectionCoordinator,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    role: Role,
}

enum SessionExit {
    Cancelled,
    RemoteHangup,
    Failed(CallError),
}

async fn run_session(
    shared: Shared,
    id: Uuid,
    room_id: RoomId,
    tracks: Vec<LocalTrack>,
    mut cancel: watch::Receiver<bool>,
    ready: oneshot::Sender<Result<Role, CallError>>,
) {
    let setup = tokio::select! {
        biased;
        _ = cancel.changed() => Err(CallError::Cancelled),
        result = establish(&shared, id, &room_id, &tracks) => result,
    };

    let session = match setup {
        Ok(session) => session,
        Err(CallError::Cancelled) => {
            tracing::info!("Call setup in room {} cancelled", room_id);
            let _ = ready.send(Err(CallError::Cancelled));
            return;
        }
        Err(e) => {
            tracing::error!("Call setup in room {} failed: {}", room_id, e);
            shared.release_media();
            shared.finish(id);
            shared.emit(CallEvent::CallFailed(e.clone()));
            let _ = ready.send(Err(e));
            return;
        }
    };

    let Session {
        mut channel,
        mut coordinator,
        mut events,
        role,
    } = session;

    if let Some(active) = shared.session.lock().as_mut().filter(|s| s.id == id) {
        active.role = Some(role);
    }
    let _ = ready.send(Ok(role));

    let exit = drive(&shared, &mut channel, &mut coordinator, &mut events, &mut cancel).await;

    match exit {
        SessionExit::Cancelled => {
            coordinator.close().await;
            channel.close();
        }
        SessionExit::RemoteHangup => {
            tracing::info!("Peer hung up in room {}", room_id);
            coordinator.close().await;
            channel.close();
            shared.release_media();
            shared.finish(id);
            shared.emit(CallEvent::RemoteHangup);
            shared.emit(CallEvent::Ended);
        }
        SessionExit::Failed(e) => {
            tracing::error!("Call in room {} failed: {}", room_id, e);
            coordinator.abort().await;
            channel.close();
            shared.release_media();
            shared.finish(id);
            shared.emit(CallEvent::CallFailed(e));
        }
    }
}

/// Raum betreten, Verbindung erstellen, Tracks anhängen, als Caller Offer senden
async fn establish(
    shared: &Shared,
    id: Uuid,
    room_id: &RoomId,
    tracks: &[LocalTrack],
) -> Result<Session, CallError> {
    let limit = shared.config.negotiation_timeout;

    let channel = match tokio::time::timeout(limit, shared.signaling.join(room_id)).await {
        Ok(joined) => joined?,
        Err(_) => {
            shared.mirror_state(id, ConnectionState::Failed);
            return Err(NegotiationError::Timeout("join room").into());
        }
    };

    let role = channel.role();
    if shared.is_current(id) {
        shared.emit(CallEvent::Joined {
            room_id: room_id.clone(),
            role,
        });
    }

    let created =
        tokio::time::timeout(limit, shared.transports.create(&shared.config.ice_servers)).await;
    let parts = match created {
        Ok(Ok(parts)) => parts,
        Ok(Err(e)) => {
            shared.mirror_state(id, ConnectionState::Failed);
            channel.close();
            return Err(NegotiationError::from(e).into());
        }
        Err(_) => {
            shared.mirror_state(id, ConnectionState::Failed);
            channel.close();
            return Err(NegotiationError::Timeout("create connection").into());
        }
    };

    let mut coordinator = ConnectionCoordinator::new(parts.transport, limit);
    let observer = shared.clone();
    coordinator.on_state_change(Box::new(move |state| observer.mirror_state(id, state)));

    if let Err(e) = negotiate_start(&mut coordinator, &channel, role, tracks).await {
        coordinator.abort().await;
        channel.close();
        return Err(e);
    }

    Ok(Session {
        channel,
        coordinator,
        events: parts.events,
        role,
    })
}

async fn negotiate_start(
    coordinator: &mut ConnectionCoordinator,
    channel: &ChannelHandle,
    role: Role,
    tracks: &[LocalTrack],
) -> Result<(), CallError> {
    for track in tracks {
        coordinator.add_local_track(track).await?;
    }

    if role == Role::Caller {
        let offer = coordinator.create_offer().await?;
        channel.send(offer)?;
        tracing::info!("Offer sent to room {}", channel.room_id());
    } else {
        tracing::info!("Waiting for offer in room {}", channel.room_id());
    }
    Ok(())
}

/// Verarbeitet Ereignisse bis die Session endet
async fn drive(
    shared: &Shared,
    channel: &mut ChannelHandle,
    coordinator: &mut ConnectionCoordinator,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    cancel: &mut watch::Receiver<bool>,
) -> SessionExit {
    let mut signaling_open = true;
    let mut media_tick = tokio::time::interval(FRAME_DURATION);
    media_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.changed() => return SessionExit::Cancelled,

            event = events.recv() => {
                let Some(event) = event else {
                    return SessionExit::Failed(transport_gone());
                };
                if let Err(e) = on_transport_event(shared, coordinator, channel, event) {
                    return SessionExit::Failed(e);
                }
                if coordinator.state() == ConnectionState::Closed {
                    return SessionExit::Failed(transport_gone());
                }
            }

            message = channel.recv(), if signaling_open => match message {
                Some(SignalingMessage::Bye) => return SessionExit::RemoteHangup,
                Some(message) => {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.changed() => return SessionExit::Cancelled,
                        outcome = on_signal(coordinator, channel, message) => outcome,
                    };
                    if let Err(e) = outcome {
                        return SessionExit::Failed(e);
                    }
                }
                None if coordinator.state().is_established() => {
                    tracing::warn!("Signaling channel closed, keeping established call");
                    signaling_open = false;
                }
                None => return SessionExit::Failed(CallError::SignalingLost),
            },

            _ = media_tick.tick() => {
                for frame in shared.take_audio_frames() {
                    if let Err(e) = coordinator.send_audio_frame(&frame).await {
                        tracing::debug!("Dropping audio frame: {}", e);
                    }
                }
            }
        }
    }
}

fn transport_gone() -> CallError {
    NegotiationError::Transport(TransportError::Closed).into()
}

fn on_transport_event(
    shared: &Shared,
    coordinator: &mut ConnectionCoordinator,
    channel: &ChannelHandle,
    event: TransportEvent,
) -> Result<(), CallError> {
    if let TransportEvent::RemoteTrack(track) = event {
        shared.emit(CallEvent::RemoteTrack(track));
        return Ok(());
    }

    if let Some(message) = coordinator.handle_transport_event(event)? {
        // Ein verlorener Candidate ist nicht kritisch
        if let Err(e) = channel.send(message) {
            tracing::warn!("Dropping local candidate: {}", e);
        }
    }
    Ok(())
}

async fn on_signal(
    coordinator: &mut ConnectionCoordinator,
    channel: &ChannelHandle,
    message: SignalingMessage,
) -> Result<(), CallError> {
    let result = match message {
        SignalingMessage::Offer { sdp } => answer_offer(coordinator, channel, sdp).await,
        SignalingMessage::Answer { sdp } => {
            coordinator.apply_answer(sdp).await.map_err(CallError::from)
        }
        SignalingMessage::IceCandidate(candidate) => coordinator
            .add_remote_candidate(candidate)
            .await
            .map_err(CallError::from),
        SignalingMessage::Bye => Ok(()),
    };

    match result {
        Err(CallError::Negotiation(e)) if !e.is_fatal() => {
            tracing::warn!("Ignoring signaling message: {}", e);
            Ok(())
        }
        other => other,
    }
}

/// Callee: Offer übernehmen und automatisch beantworten
async fn answer_offer(
    coordinator: &mut ConnectionCoordinator,
    channel: &ChannelHandle,
    sdp: String,
) -> Result<(), CallError> {
    coordinator.apply_offer(sdp).await?;
    let answer = coordinator.create_answer().await?;
    channel.send(answer)?;
    tracing::info!("Answer sent to room {}", channel.room_id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{JoinError, MemorySignaling};
    use crate::testing::{FakeMediaSource, FakeTransportFactory};
    use std::time::Duration;

    fn controller(media: FakeMediaSource, signaling: &MemorySignaling) -> CallSessionController {
        CallSessionController::new(
            CallConfig::default(),
            Arc::new(media),
            Arc::new(signaling.clone()),
            Arc::new(FakeTransportFactory::new()),
        )
    }

    #[tokio::test]
    async fn test_start_without_media_does_not_join() {
        let signaling = MemorySignaling::new();
        let controller = controller(FakeMediaSource::granting(), &signaling);

        let err = controller.start_call("r1").await.unwrap_err();
        assert_eq!(err, CallError::MediaNotReady);
        assert_eq!(signaling.join_attempts(), 0);
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_prepare_is_reused_until_released() {
        let signaling = MemorySignaling::new();
        let media = FakeMediaSource::granting();
        let controller = controller(media.clone(), &signaling);

        let first = controller.prepare_local_media(&MediaConstraints::audio()).await.unwrap();
        let second = controller.prepare_local_media(&MediaConstraints::audio()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(media.acquired(), 1);

        controller.end_call().await;
        assert_eq!(media.released(), 1);
        assert!(!controller.has_local_media());
        assert_eq!(controller.connection_state(), ConnectionState::New);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_timeout() {
        let signaling = MemorySignaling::new();
        let controller = CallSessionController::new(
            CallConfig::default().with_negotiation_timeout(Duration::from_secs(5)),
            Arc::new(FakeMediaSource::stalling()),
            Arc::new(signaling.clone()),
            Arc::new(FakeTransportFactory::new()),
        );

        let err = controller
            .prepare_local_media(&MediaConstraints::audio())
            .await
            .unwrap_err();
        assert_eq!(err, MediaError::Timeout);
    }

    /// Signaling, dessen Join nie antwortet
    struct StallingSignaling;

    #[async_trait::async_trait]
    impl SignalingChannel for StallingSignaling {
        async fn join(&self, _room_id: &RoomId) -> Result<ChannelHandle, JoinError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_timeout_marks_call_failed() {
        let controller = CallSessionController::new(
            CallConfig::default().with_negotiation_timeout(Duration::from_secs(5)),
            Arc::new(FakeMediaSource::granting()),
            Arc::new(StallingSignaling),
            Arc::new(FakeTransportFactory::new()),
        );
        controller.prepare_local_media(&MediaConstraints::audio()).await.unwrap();
        let mut events = controller.subscribe();

        let err = controller.start_call("r1").await.unwrap_err();
        assert_eq!(
            err,
            CallError::Negotiation(NegotiationError::Timeout("join room"))
        );
        assert_eq!(controller.connection_state(), ConnectionState::Failed);
        assert!(!controller.is_active());

        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            saw_failed |= event == CallEvent::StateChanged(ConnectionState::Failed);
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn test_ended_session_does_not_announce_join() {
        let signaling = MemorySignaling::new();
        let controller = controller(FakeMediaSource::granting(), &signaling);
        controller.prepare_local_media(&MediaConstraints::audio()).await.unwrap();
        let tracks = match controller.shared.local_media.lock().as_ref() {
            Some(media) => media.tracks().to_vec(),
            None => panic!("media not prepared"),
        };
        let mut events = controller.subscribe();

        // Session-ID, die nicht (mehr) im Slot steht
        let session = establish(&controller.shared, Uuid::new_v4(), &RoomId::from("r1"), &tracks)
            .await
            .unwrap();
        assert_eq!(session.role, Role::Caller);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert_eq!(controller.connection_state(), ConnectionState::New);
    }

    #[tokio::test]
    async fn test_mute_follows_local_media() {
        let signaling = MemorySignaling::new();
        let controller = controller(FakeMediaSource::granting(), &signaling);

        controller.set_muted(true);
        assert!(!controller.is_muted());

        controller.prepare_local_media(&MediaConstraints::audio()).await.unwrap();
        controller.set_muted(true);
        assert!(controller.is_muted());
        assert_eq!(controller.input_level(), 0.0);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let signaling = MemorySignaling::new();
        let controller = controller(FakeMediaSource::granting(), &signaling);
        controller.prepare_local_media(&MediaConstraints::audio()).await.unwrap();

        assert_eq!(controller.start_call("r1").await.unwrap(), Role::Caller);
        assert_eq!(
            controller.start_call("r2").await.unwrap_err(),
            CallError::AlreadyInCall
        );
        assert_eq!(controller.room_id(), Some(RoomId::from("r1")));
        assert_eq!(controller.role(), Some(Role::Caller));
    }

    #[tokio::test]
    async fn test_restart_without_previous_call() {
        let signaling = MemorySignaling::new();
        let controller = controller(FakeMediaSource::granting(), &signaling);

        assert_eq!(
            controller.restart_call(&MediaConstraints::audio()).await.unwrap_err(),
            CallError::NoPreviousRoom
        );
    }
}
