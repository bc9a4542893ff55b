//! Mikrofon Capture mit cpal
//!
//! Der cpal-Stream ist nicht `Send`. Er lebt deshalb auf einem eigenen
//! Thread, der bis zum Stop-Signal blockiert. Samples landen als Mono @ 48kHz
//! in einem Ring-Buffer.

use super::{
    LocalMediaHandle, LocalTrack, MediaCapture, MediaConstraints, MediaError, MediaSource,
    TrackKind,
};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sample Rate (48kHz wie Opus)
pub const SAMPLE_RATE: u32 = 48000;

/// Channels (Mono für Voice)
pub const CHANNELS: u16 = 1;

/// Frame Size in Samples (20ms @ 48kHz = 960 samples)
pub const FRAME_SIZE: usize = 960;

/// Dauer eines Frames
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Buffer Size für den Capture-Ring-Buffer
const RING_BUFFER_SIZE: usize = FRAME_SIZE * 10;

// ============================================================================
// MICROPHONE SOURCE
// ============================================================================

/// Produktions-Quelle: Standard- oder benanntes Eingabegerät
#[derive(Debug, Default, Clone)]
pub struct MicrophoneSource;

impl MicrophoneSource {
    pub fn new() -> Self {
        Self
    }

    /// Namen aller Eingabegeräte
    pub fn input_devices() -> Result<Vec<String>, MediaError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?;

        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

#[async_trait]
impl MediaSource for MicrophoneSource {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaHandle, MediaError> {
        let shared = Arc::new(CaptureShared::new());
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device_name = constraints.device.clone();
        let thread_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || match open_capture(device_name.as_deref(), thread_shared) {
                Ok((stream, label)) => {
                    let _ = ready_tx.send(Ok(label));
                    // Blockiert bis zum Stop oder bis der Sender gedroppt wird
                    let _ = stop_rx.recv();
                    drop(stream);
                    tracing::info!("Audio capture stopped");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?;

        let label = ready_rx.await.map_err(|_| {
            MediaError::DeviceUnavailable("capture thread exited unexpectedly".to_string())
        })??;

        let track = LocalTrack {
            id: Uuid::new_v4().to_string(),
            kind: TrackKind::Audio,
            stream_id: Uuid::new_v4().to_string(),
            label,
        };

        tracing::info!("Microphone acquired: {}", track.label);

        Ok(LocalMediaHandle::new(
            vec![track],
            Box::new(MicrophoneCapture {
                stop_tx: Some(stop_tx),
                shared,
            }),
        ))
    }
}

// ============================================================================
// CAPTURE STATE
// ============================================================================

struct CaptureShared {
    /// Ring-Buffer für aufgenommenes Audio (Mono PCM @ 48kHz)
    buffer: Mutex<HeapRb<f32>>,
    muted: AtomicBool,
    /// Audio Level (0.0 - 1.0) für Visualisierung
    level: Mutex<f32>,
}

impl CaptureShared {
    fn new() -> Self {
        Self {
            buffer: Mutex::new(HeapRb::new(RING_BUFFER_SIZE)),
            muted: AtomicBool::new(false),
            level: Mutex::new(0.0),
        }
    }

    /// Verarbeitet einen Callback-Block (interleaved, beliebige Kanalzahl)
    fn ingest(&self, data: &[f32], channels: usize, source_rate: u32) {
        let mono = downmix_to_mono(data, channels);
        *self.level.lock() = rms(&mono).min(1.0);

        if self.muted.load(Ordering::Relaxed) {
            return;
        }

        let samples = resample_linear(&mono, source_rate, SAMPLE_RATE);
        let mut buffer = self.buffer.lock();
        for sample in samples {
            let _ = buffer.try_push(sample);
        }
    }
}

struct MicrophoneCapture {
    stop_tx: Option<std_mpsc::Sender<()>>,
    shared: Arc<CaptureShared>,
}

impl MediaCapture for MicrophoneCapture {
    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        *self.shared.level.lock() = 0.0;
    }

    fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Relaxed);
    }

    fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Relaxed)
    }

    fn input_level(&self) -> f32 {
        *self.shared.level.lock()
    }

    fn read_frame(&self) -> Option<Vec<f32>> {
        let mut buffer = self.shared.buffer.lock();
        if buffer.occupied_len() < FRAME_SIZE {
            return None;
        }

        let mut frame = Vec::with_capacity(FRAME_SIZE);
        for _ in 0..FRAME_SIZE {
            if let Some(sample) = buffer.try_pop() {
                frame.push(sample);
            }
        }
        Some(frame)
    }
}

// ============================================================================
// DEVICE SETUP
// ============================================================================

/// Öffnet das Gerät und startet den Stream (läuft auf dem Capture-Thread)
fn open_capture(
    device_name: Option<&str>,
    shared: Arc<CaptureShared>,
) -> Result<(Stream, String), MediaError> {
    let device = find_input_device(device_name)?;
    let label = device.name().unwrap_or_else(|_| "Unknown microphone".to_string());

    let configs = device
        .supported_input_configs()
        .map_err(|e| classify_backend_error(e.to_string()))?;
    let supported = select_best_config(configs.collect())?;
    let sample_format = supported.sample_format();
    let config = supported.config();

    tracing::info!(
        "Starting audio capture on '{}': {} Hz, {} channels, {:?}",
        label,
        config.sample_rate.0,
        config.channels,
        sample_format
    );

    let channels = config.channels as usize;
    let source_rate = config.sample_rate.0;
    let on_error = |err: cpal::StreamError| tracing::error!("Audio capture error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                shared.ingest(data, channels, source_rate);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> =
                    data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                shared.ingest(&converted, channels, source_rate);
            },
            on_error,
            None,
        ),
        other => {
            return Err(MediaError::DeviceUnavailable(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| classify_backend_error(e.to_string()))?;

    stream
        .play()
        .map_err(|e| classify_backend_error(e.to_string()))?;

    Ok((stream, label))
}

fn find_input_device(name: Option<&str>) -> Result<Device, MediaError> {
    let host = cpal::default_host();

    match name {
        None => host.default_input_device().ok_or_else(|| {
            MediaError::DeviceUnavailable("no audio input device found".to_string())
        }),
        Some(name) => host
            .input_devices()
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| {
                MediaError::DeviceUnavailable(format!("input device '{}' not found", name))
            }),
    }
}

/// Backends melden fehlende Berechtigungen nur als Freitext
fn classify_backend_error(message: String) -> MediaError {
    let lower = message.to_lowercase();
    if ["permission", "denied", "not authorized"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        MediaError::PermissionDenied
    } else {
        MediaError::DeviceUnavailable(message)
    }
}

/// Wählt die beste Konfiguration aus einer Liste
fn select_best_config(
    configs: Vec<SupportedStreamConfigRange>,
) -> Result<SupportedStreamConfig, MediaError> {
    // Priorität: 48kHz > andere, F32 > I16
    let target_rate = cpal::SampleRate(SAMPLE_RATE);
    let supports_target = |c: &SupportedStreamConfigRange| {
        c.min_sample_rate() <= target_rate && c.max_sample_rate() >= target_rate
    };
    let usable = |c: &SupportedStreamConfigRange| {
        matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16)
    };

    for format in [SampleFormat::F32, SampleFormat::I16] {
        if let Some(config) = configs
            .iter()
            .find(|c| c.sample_format() == format && supports_target(*c))
        {
            return Ok(config.clone().with_sample_rate(target_rate));
        }
    }

    // Fallback: höchste Rate eines verwendbaren Formats, wird resampled
    configs
        .iter()
        .find(|c| usable(*c))
        .map(|c| c.clone().with_max_sample_rate())
        .ok_or_else(|| {
            MediaError::DeviceUnavailable("no suitable audio configuration found".to_string())
        })
}

// ============================================================================
// SIGNAL HELPERS
// ============================================================================

fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Einfaches Linear-Resampling
fn resample_linear(data: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || data.is_empty() {
        return data.to_vec();
    }

    let ratio = target_rate as f32 / source_rate as f32;
    let new_len = (data.len() as f32 * ratio) as usize;
    (0..new_len)
        .map(|i| {
            let src_idx = i as f32 / ratio;
            let idx = src_idx as usize;
            let frac = src_idx - idx as f32;
            let s1 = data.get(idx).copied().unwrap_or(0.0);
            let s2 = data.get(idx + 1).copied().unwrap_or(s1);
            s1 + (s2 - s1) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(format: SampleFormat, min: u32, max: u32) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            2,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_select_prefers_f32_at_48k() {
        let configs = vec![
            range(SampleFormat::I16, 8000, 48000),
            range(SampleFormat::F32, 8000, 96000),
        ];
        let selected = select_best_config(configs).unwrap();
        assert_eq!(selected.sample_format(), SampleFormat::F32);
        assert_eq!(selected.sample_rate().0, SAMPLE_RATE);
    }

    #[test]
    fn test_select_falls_back_to_max_rate() {
        let configs = vec![
            range(SampleFormat::U8, 8000, 48000),
            range(SampleFormat::F32, 8000, 44100),
        ];
        let selected = select_best_config(configs).unwrap();
        assert_eq!(selected.sample_format(), SampleFormat::F32);
        assert_eq!(selected.sample_rate().0, 44100);
    }

    #[test]
    fn test_select_without_usable_format() {
        let configs = vec![range(SampleFormat::U8, 8000, 48000)];
        assert!(matches!(
            select_best_config(configs),
            Err(MediaError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_downmix_and_resample() {
        let stereo = [1.0, 0.0, 0.5, 0.5];
        assert_eq!(downmix_to_mono(&stereo, 2), vec![0.5, 0.5]);

        let upsampled = resample_linear(&[0.0, 1.0], 24000, 48000);
        assert_eq!(upsampled.len(), 4);
        assert_eq!(upsampled[1], 0.5);
    }

    #[test]
    fn test_muted_capture_keeps_level_but_drops_samples() {
        let shared = CaptureShared::new();
        shared.muted.store(true, Ordering::Relaxed);
        shared.ingest(&[0.5; FRAME_SIZE], 1, SAMPLE_RATE);

        assert!(*shared.level.lock() > 0.4);
        assert_eq!(shared.buffer.lock().occupied_len(), 0);

        shared.muted.store(false, Ordering::Relaxed);
        shared.ingest(&[0.5; FRAME_SIZE], 1, SAMPLE_RATE);
        assert_eq!(shared.buffer.lock().occupied_len(), FRAME_SIZE);
    }

    #[test]
    fn test_frames_are_read_back_through_handle() {
        let shared = Arc::new(CaptureShared::new());
        let mut handle = LocalMediaHandle::new(
            Vec::new(),
            Box::new(MicrophoneCapture {
                stop_tx: None,
                shared: Arc::clone(&shared),
            }),
        );

        // 30ms Stereo @ 24kHz: nach Downmix und Resampling 1.5 Frames
        let block = vec![0.5f32; 720 * 2];
        shared.ingest(&block, 2, 24000);

        let frame = handle.read_frame().unwrap();
        assert_eq!(frame.len(), FRAME_SIZE);
        assert!(frame.iter().all(|s| (s - 0.5).abs() < 1e-6));
        assert!(handle.read_frame().is_none());

        shared.ingest(&block, 2, 24000);
        assert!(handle.read_frame().is_some());

        handle.release();
        shared.ingest(&block, 2, 24000);
        assert!(handle.read_frame().is_none());
    }

    #[test]
    fn test_permission_errors_are_classified() {
        assert_eq!(
            classify_backend_error("Access denied by system".to_string()),
            MediaError::PermissionDenied
        );
        assert!(matches!(
            classify_backend_error("device disconnected".to_string()),
            MediaError::DeviceUnavailable(_)
        ));
    }
}
