//! Test-Doubles für Transport und Medien
//!
//! Werden von den Unit- und Integrationstests genutzt und eignen sich für
//! Demos ohne Audio-Hardware. Zusammen mit
//! [`MemorySignaling`](crate::signaling::MemorySignaling) laufen komplette
//! Calls im selben Prozess.

use crate::config::IceServerConfig;
use crate::connection::{
    PeerTransport, RemoteTrackInfo, SessionDescription, TransportError, TransportEvent,
    TransportFactory, TransportParts, TransportState,
};
use crate::media::{
    LocalMediaHandle, LocalTrack, MediaCapture, MediaConstraints, MediaError, MediaSource,
    TrackKind, FRAME_SIZE,
};
use crate::signaling::IceCandidate;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Minimale SDP, die der Fake-Transport akzeptiert
pub const FAKE_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

// ============================================================================
// FAKE TRANSPORT
// ============================================================================

/// Stellschrauben für Fehlerfälle
#[derive(Debug, Clone, Default)]
pub struct FakeBehaviour {
    /// `create_answer` kehrt nie zurück
    pub stall_create_answer: bool,
    /// Jede Remote Description wird abgelehnt
    pub reject_remote_descriptions: bool,
    /// Die Factory kann keine Verbindung erstellen
    pub fail_create: bool,
}

#[derive(Debug, Default)]
struct FakeLog {
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    applied_candidates: Vec<IceCandidate>,
    tracks: Vec<LocalTrack>,
    audio_frames: usize,
    closed: bool,
}

struct FakeTransport {
    behaviour: FakeBehaviour,
    log: Arc<Mutex<FakeLog>>,
}

impl FakeTransport {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.log.lock().closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn description(&self, kind: &str) -> SessionDescription {
        let sdp = format!("{}a=fake:{}\r\n", FAKE_SDP, kind);
        match kind {
            "offer" => SessionDescription::offer(sdp),
            _ => SessionDescription::answer(sdp),
        }
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn add_local_track(&self, track: &LocalTrack) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.log.lock().tracks.push(track.clone());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        Ok(self.description("offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        if self.behaviour.stall_create_answer {
            std::future::pending::<()>().await;
        }
        Ok(self.description("answer"))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.log.lock().local_description = Some(description);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.behaviour.reject_remote_descriptions || !description.sdp.starts_with("v=0") {
            return Err(TransportError::InvalidDescription(
                "unparseable session description".to_string(),
            ));
        }
        self.log.lock().remote_description = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut log = self.log.lock();
        if log.remote_description.is_none() {
            return Err(TransportError::InvalidCandidate(
                "remote description not set".to_string(),
            ));
        }
        if candidate.candidate.is_empty() {
            return Err(TransportError::InvalidCandidate("empty candidate".to_string()));
        }
        log.applied_candidates.push(candidate);
        Ok(())
    }

    async fn write_audio_frame(&self, frame: &[f32]) -> Result<(), TransportError> {
        self.ensure_open()?;
        if frame.len() != FRAME_SIZE {
            return Err(TransportError::Rtc(format!(
                "expected {} samples, got {}",
                FRAME_SIZE,
                frame.len()
            )));
        }

        let mut log = self.log.lock();
        if !log.tracks.is_empty() {
            log.audio_frames += 1;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.log.lock().closed = true;
        Ok(())
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.log.lock().closed = true;
    }
}

/// Sicht des Tests auf einen Fake-Transport
#[derive(Clone)]
pub struct FakeTransportHandle {
    log: Arc<Mutex<FakeLog>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl FakeTransportHandle {
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.log.lock().local_description.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.log.lock().remote_description.clone()
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.log.lock().applied_candidates.clone()
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.log.lock().tracks.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().closed
    }

    /// Anzahl gesendeter Mikrofon-Frames
    pub fn audio_frames(&self) -> usize {
        self.log.lock().audio_frames
    }

    /// Simuliert einen lokal entdeckten Candidate
    pub fn emit_local_candidate(&self, candidate: IceCandidate) {
        let _ = self.events.send(TransportEvent::LocalCandidate(candidate));
    }

    /// Simuliert einen Zustandswechsel der Verbindung
    pub fn report_state(&self, state: TransportState) {
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    pub fn report_remote_track(&self, track: RemoteTrackInfo) {
        let _ = self.events.send(TransportEvent::RemoteTrack(track));
    }
}

/// Einzelner Fake-Transport ohne Factory
pub fn fake_transport(behaviour: FakeBehaviour) -> (TransportParts, FakeTransportHandle) {
    let log = Arc::new(Mutex::new(FakeLog::default()));
    let (events_tx, events) = mpsc::unbounded_channel();

    let transport = FakeTransport {
        behaviour,
        log: Arc::clone(&log),
    };
    let handle = FakeTransportHandle {
        log,
        events: events_tx,
    };

    (
        TransportParts {
            transport: Box::new(transport),
            events,
        },
        handle,
    )
}

/// Factory, die jede erstellte Verbindung für den Test festhält
#[derive(Clone, Default)]
pub struct FakeTransportFactory {
    behaviour: FakeBehaviour,
    handles: Arc<Mutex<Vec<FakeTransportHandle>>>,
}

impl FakeTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behaviour(behaviour: FakeBehaviour) -> Self {
        Self {
            behaviour,
            handles: Arc::default(),
        }
    }

    /// Alle bisher erstellten Verbindungen in Erstellungsreihenfolge
    pub fn handles(&self) -> Vec<FakeTransportHandle> {
        self.handles.lock().clone()
    }

    pub fn last(&self) -> Option<FakeTransportHandle> {
        self.handles.lock().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
    ) -> Result<TransportParts, TransportError> {
        if self.behaviour.fail_create {
            return Err(TransportError::Rtc("fake transport unavailable".to_string()));
        }

        tracing::debug!(
            "Creating fake transport with {} ICE server(s)",
            ice_servers.len()
        );
        let (parts, handle) = fake_transport(self.behaviour.clone());
        self.handles.lock().push(handle);
        Ok(parts)
    }
}

// ============================================================================
// FAKE MEDIA
// ============================================================================

enum FakeGrant {
    Grant,
    Deny(MediaError),
    Stall,
}

/// Medienquelle mit Zählern für Acquire/Release
#[derive(Clone)]
pub struct FakeMediaSource {
    grant: Arc<FakeGrant>,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl FakeMediaSource {
    pub fn granting() -> Self {
        Self::with_grant(FakeGrant::Grant)
    }

    pub fn denying(error: MediaError) -> Self {
        Self::with_grant(FakeGrant::Deny(error))
    }

    /// Der Zugriff wird nie beantwortet (wie ein offener Berechtigungsdialog)
    pub fn stalling() -> Self {
        Self::with_grant(FakeGrant::Stall)
    }

    fn with_grant(grant: FakeGrant) -> Self {
        Self {
            grant: Arc::new(grant),
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSource for FakeMediaSource {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaHandle, MediaError> {
        match &*self.grant {
            FakeGrant::Grant => {}
            FakeGrant::Deny(error) => return Err(error.clone()),
            FakeGrant::Stall => std::future::pending::<()>().await,
        }

        let count = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        let track = LocalTrack {
            id: format!("fake-audio-{}", count),
            kind: TrackKind::Audio,
            stream_id: format!("fake-stream-{}", count),
            label: constraints
                .device
                .clone()
                .unwrap_or_else(|| "Fake Microphone".to_string()),
        };

        Ok(LocalMediaHandle::new(
            vec![track],
            Box::new(FakeCapture {
                released: Arc::clone(&self.released),
                stopped: false,
                muted: AtomicBool::new(false),
            }),
        ))
    }
}

struct FakeCapture {
    released: Arc<AtomicUsize>,
    stopped: bool,
    muted: AtomicBool,
}

impl MediaCapture for FakeCapture {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn input_level(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            0.25
        }
    }

    /// Liefert ununterbrochen Frames, außer stumm oder gestoppt
    fn read_frame(&self) -> Option<Vec<f32>> {
        if self.stopped || self.is_muted() {
            None
        } else {
            Some(vec![0.25; FRAME_SIZE])
        }
    }
}
