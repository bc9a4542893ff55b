//! Media Module - Lokale Audio-Aufnahme
//!
//! Dieses Modul verwaltet:
//! - Zugriff auf das Mikrofon über eine austauschbare [`MediaSource`]
//! - [`LocalMediaHandle`] als RAII-Guard: alle Tracks werden beim Drop gestoppt
//! - Mikrofon-Capture mit cpal (Produktion)

mod microphone;

pub use microphone::{MicrophoneSource, CHANNELS, FRAME_DURATION, FRAME_SIZE, SAMPLE_RATE};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Microphone access denied")]
    PermissionDenied,

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Timed out waiting for microphone access")]
    Timeout,
}

// ============================================================================
// TRACKS & CONSTRAINTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Ein lokal aufgenommener Track, der an die Peer Connection gehängt wird
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
    /// Gerätename für die Anzeige
    pub label: String,
}

/// Anforderungen an die Aufnahme
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Name des Eingabegeräts, `None` = Standardgerät
    pub device: Option<String>,
}

impl MediaConstraints {
    pub fn audio() -> Self {
        Self::default()
    }

    pub fn with_device(device: impl Into<String>) -> Self {
        Self {
            device: Some(device.into()),
        }
    }
}

// ============================================================================
// CAPTURE BACKENDS
// ============================================================================

/// Laufende Aufnahme hinter einem [`LocalMediaHandle`]
pub trait MediaCapture: Send {
    /// Stoppt alle Tracks; weitere Aufrufe sind wirkungslos
    fn stop(&mut self);

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;

    /// Eingangspegel (RMS, 0.0 - 1.0)
    fn input_level(&self) -> f32;

    /// Nächster PCM-Frame, falls genug Samples gepuffert sind
    fn read_frame(&self) -> Option<Vec<f32>>;
}

/// Quelle für lokale Medien (Mikrofon oder Test-Double)
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMediaHandle, MediaError>;
}

// ============================================================================
// LOCAL MEDIA HANDLE
// ============================================================================

/// Besitz der aufgenommenen Tracks
///
/// Die Aufnahme wird genau einmal gestoppt: explizit über
/// [`LocalMediaHandle::release`] oder spätestens beim Drop.
pub struct LocalMediaHandle {
    tracks: Vec<LocalTrack>,
    capture: Option<Box<dyn MediaCapture>>,
}

impl LocalMediaHandle {
    pub fn new(tracks: Vec<LocalTrack>, capture: Box<dyn MediaCapture>) -> Self {
        Self {
            tracks,
            capture: Some(capture),
        }
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn is_released(&self) -> bool {
        self.capture.is_none()
    }

    /// Stoppt alle Tracks (idempotent)
    pub fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            tracing::info!("Released local media ({} track(s))", self.tracks.len());
        }
    }

    pub fn set_muted(&self, muted: bool) {
        if let Some(capture) = &self.capture {
            capture.set_muted(muted);
            tracing::debug!("Audio muted: {}", muted);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.is_muted())
    }

    pub fn input_level(&self) -> f32 {
        self.capture.as_ref().map(|c| c.input_level()).unwrap_or(0.0)
    }

    pub fn read_frame(&self) -> Option<Vec<f32>> {
        self.capture.as_ref().and_then(|c| c.read_frame())
    }
}

impl Drop for LocalMediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for LocalMediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaHandle")
            .field("tracks", &self.tracks)
            .field("released", &self.is_released())
            .finish()
    }
}
