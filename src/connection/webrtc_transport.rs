//! WebRTC Transport
//!
//! Produktions-Implementierung von [`PeerTransport`] auf Basis von
//! webrtc-rs. Jeder Call bekommt eine eigene `RTCPeerConnection`.
//!
//! Mikrofon-Frames werden mit dem Feature `opus-support` Opus-kodiert
//! und als Samples in die lokalen Tracks geschrieben. Ohne das Feature
//! läuft die Aushandlung normal, der Track bleibt aber stumm.

use super::transport::{
    PeerTransport, RemoteTrackInfo, SdpKind, SessionDescription, TransportError, TransportEvent,
    TransportFactory, TransportParts, TransportState,
};
use crate::config::IceServerConfig;
use crate::media::{LocalTrack, TrackKind, CHANNELS, FRAME_DURATION, SAMPLE_RATE};
use crate::signaling::IceCandidate;
use async_trait::async_trait;
#[cfg(feature = "opus-support")]
use opus::{Application, Channels, Encoder as OpusEncoder};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::media::Sample;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Obergrenze für ein Opus-Paket
#[cfg(feature = "opus-support")]
const MAX_PACKET_BYTES: usize = 4000;

fn rtc_error(e: webrtc::Error) -> TransportError {
    TransportError::Rtc(e.to_string())
}

// ============================================================================
// ENCODER
// ============================================================================

/// Opus-Encoder für Mono-Frames @ 48kHz
struct AudioEncoder {
    #[cfg(feature = "opus-support")]
    inner: Mutex<OpusEncoder>,
}

impl AudioEncoder {
    #[cfg(feature = "opus-support")]
    fn new() -> Result<Self, TransportError> {
        let encoder = OpusEncoder::new(SAMPLE_RATE, Channels::Mono, Application::Voip)
            .map_err(|e| TransportError::Rtc(format!("Opus encoder init failed: {}", e)))?;
        Ok(Self {
            inner: Mutex::new(encoder),
        })
    }

    #[cfg(not(feature = "opus-support"))]
    fn new() -> Result<Self, TransportError> {
        tracing::warn!("Built without opus-support, local audio track stays silent");
        Ok(Self {})
    }

    #[cfg(feature = "opus-support")]
    fn encode(&self, frame: &[f32]) -> Result<Vec<u8>, TransportError> {
        let mut packet = vec![0u8; MAX_PACKET_BYTES];
        let len = self
            .inner
            .lock()
            .encode_float(frame, &mut packet)
            .map_err(|e| TransportError::Rtc(format!("Opus encode failed: {}", e)))?;
        packet.truncate(len);
        Ok(packet)
    }

    #[cfg(not(feature = "opus-support"))]
    fn encode(&self, _frame: &[f32]) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Rtc("built without opus-support".to_string()))
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Erstellt Peer Connections mit Opus und den Standard-Interceptors
#[derive(Debug, Default, Clone)]
pub struct WebRtcTransportFactory;

impl WebRtcTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
    ) -> Result<TransportParts, TransportError> {
        // Media Engine mit Standard-Codecs (inkl. Opus)
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(rtc_error)?;

        // Interceptors für RTCP, NACK etc.
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(rtc_error)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await.map_err(rtc_error)?);

        let (events_tx, events) = mpsc::unbounded_channel();
        register_handlers(&pc, events_tx);

        tracing::info!("Peer connection created ({} ICE server(s))", ice_servers.len());

        Ok(TransportParts {
            transport: Box::new(WebRtcTransport {
                pc,
                tracks: Mutex::new(Vec::new()),
                encoder: AudioEncoder::new()?,
            }),
            events,
        })
    }
}

fn to_rtc_ice_server(server: &IceServerConfig) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

/// Leitet Ereignisse der Peer Connection in den Ereigniskanal
fn register_handlers(pc: &RTCPeerConnection, events_tx: mpsc::UnboundedSender<TransportEvent>) {
    // Connection State Handler
    let tx = events_tx.clone();
    pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        tracing::info!("Peer connection state: {:?}", s);

        let state = match s {
            RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
            RTCPeerConnectionState::Connected => Some(TransportState::Connected),
            RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
            RTCPeerConnectionState::Failed => Some(TransportState::Failed),
            RTCPeerConnectionState::Closed => Some(TransportState::Closed),
            _ => None,
        };

        if let Some(state) = state {
            let _ = tx.send(TransportEvent::StateChanged(state));
        }

        Box::pin(async {})
    }));

    // ICE Candidate Handler
    let tx = events_tx.clone();
    pc.on_ice_candidate(Box::new(move |candidate| {
        if let Some(c) = candidate {
            match c.to_json() {
                Ok(init) => {
                    let _ = tx.send(TransportEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mline_index: init.sdp_mline_index,
                        sdp_mid: init.sdp_mid,
                    }));
                }
                Err(e) => tracing::warn!("Failed to serialize local candidate: {}", e),
            }
        }
        Box::pin(async {})
    }));

    // Track Handler (eingehendes Audio)
    let tx = events_tx;
    pc.on_track(Box::new(move |track, _, _| {
        let info = RemoteTrackInfo {
            id: track.id(),
            stream_id: track.stream_id(),
            kind: match track.kind() {
                RTPCodecType::Video => TrackKind::Video,
                _ => TrackKind::Audio,
            },
            codec: track.codec().capability.mime_type,
        };
        tracing::info!("Received remote track: {:?}", info);
        let _ = tx.send(TransportEvent::RemoteTrack(info));

        Box::pin(async {})
    }));
}

// ============================================================================
// TRANSPORT
// ============================================================================

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    /// Lokale Audio-Tracks, gehalten solange die Verbindung lebt
    tracks: Mutex<Vec<Arc<TrackLocalStaticSample>>>,
    encoder: AudioEncoder,
}

impl WebRtcTransport {
    fn to_rtc_description(
        description: SessionDescription,
    ) -> Result<RTCSessionDescription, TransportError> {
        let result = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        };
        result.map_err(|e| TransportError::InvalidDescription(e.to_string()))
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_local_track(&self, track: &LocalTrack) -> Result<(), TransportError> {
        if track.kind != TrackKind::Audio {
            return Err(TransportError::Rtc(format!(
                "unsupported local track kind {:?}",
                track.kind
            )));
        }

        let sample_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: SAMPLE_RATE,
                channels: CHANNELS,
                ..Default::default()
            },
            track.id.clone(),
            track.stream_id.clone(),
        ));

        self.pc
            .add_track(Arc::clone(&sample_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(rtc_error)?;

        self.tracks.lock().push(sample_track);
        Ok(())
    }

    async fn write_audio_frame(&self, frame: &[f32]) -> Result<(), TransportError> {
        let tracks = self.tracks.lock().clone();
        if tracks.is_empty() {
            return Ok(());
        }

        let packet = self.encoder.encode(frame)?;
        let sample = Sample {
            data: packet.into(),
            duration: FRAME_DURATION,
            ..Default::default()
        };

        for track in tracks {
            track.write_sample(&sample).await.map_err(rtc_error)?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let offer = self.pc.create_offer(None).await.map_err(rtc_error)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.pc.create_answer(None).await.map_err(rtc_error)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        let description = Self::to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(rtc_error)
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        let description = Self::to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| TransportError::InvalidDescription(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| TransportError::InvalidCandidate(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.tracks.lock().clear();
        self.pc.close().await.map_err(rtc_error)
    }
}

impl Drop for WebRtcTransport {
    fn drop(&mut self) {
        // Peer Connection im Hintergrund schließen (z.B. nach Abbruch)
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let pc = Arc::clone(&self.pc);
            runtime.spawn(async move {
                let _ = pc.close().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_server_mapping() {
        let server = IceServerConfig {
            urls: vec!["turn:turn.example.org:3478".to_string()],
            username: Some("user".to_string()),
            credential: Some("secret".to_string()),
        };
        let rtc = to_rtc_ice_server(&server);
        assert_eq!(rtc.urls, server.urls);
        assert_eq!(rtc.username, "user");
        assert_eq!(rtc.credential, "secret");

        let stun = to_rtc_ice_server(&IceServerConfig::stun(["stun:stun.l.google.com:19302"]));
        assert!(stun.username.is_empty());
    }

    #[test]
    fn test_invalid_sdp_is_rejected() {
        let result = WebRtcTransport::to_rtc_description(SessionDescription::offer("not sdp"));
        assert!(matches!(result, Err(TransportError::InvalidDescription(_))));
    }
}
