//! Capture control: records user speech and coordinates barge-in.
//!
//! Starting a recording while a response is playing must cut playback and
//! produce exactly one interruption notice before any of the new speech is
//! sent upstream.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::convert;
use super::playback::PlaybackBuffer;
use super::turn::{TurnState, TurnTracker};
use super::{AudioError, AudioResult};

/// Capture device abstraction.
///
/// `start` begins delivering float sample blocks on the given channel until
/// `stop` is called. Implementations own their device thread; the controller
/// only ever sees samples.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Native rate of the device, in Hz.
    fn sample_rate(&self) -> u32;

    async fn start(&self, chunks: mpsc::Sender<Vec<f32>>) -> AudioResult<()>;

    async fn stop(&self) -> AudioResult<()>;
}

/// Outcome of starting a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingStart {
    /// Recording began from a quiet state
    Started,
    /// Recording cut off a response in progress; the timestamp (epoch
    /// milliseconds) marks when the user barged in
    Interrupted { timestamp: u64 },
    /// Already recording; nothing changed
    AlreadyRecording,
}

struct ActiveRecording {
    samples: Arc<Mutex<Vec<f32>>>,
    collector: tokio::task::JoinHandle<()>,
}

/// Drives the capture device and the turn state machine.
pub struct CaptureController {
    capture: Arc<dyn AudioCapture>,
    playback: Arc<PlaybackBuffer>,
    turn: Mutex<TurnTracker>,
    active: Mutex<Option<ActiveRecording>>,
}

impl CaptureController {
    pub fn new(capture: Arc<dyn AudioCapture>, playback: Arc<PlaybackBuffer>) -> Self {
        Self {
            capture,
            playback,
            turn: Mutex::new(TurnTracker::new()),
            active: Mutex::new(None),
        }
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn.lock().state()
    }

    /// Model audio started arriving for the current response.
    pub fn note_response_started(&self) {
        self.turn.lock().begin_response();
    }

    /// The model finished its turn and playback drained.
    pub fn note_response_complete(&self) {
        self.turn.lock().response_complete();
    }

    /// Start recording the user.
    ///
    /// On barge-in the playback queue is cleared before this returns, so no
    /// stale response audio plays under the user's speech.
    pub async fn start_recording(&self) -> AudioResult<RecordingStart> {
        if self.active.lock().is_some() {
            return Ok(RecordingStart::AlreadyRecording);
        }

        let interrupted = self.turn.lock().begin_recording();
        if interrupted {
            self.playback.interrupt().await?;
        }

        let samples = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::channel::<Vec<f32>>(64);
        let sink = Arc::clone(&samples);
        let collector = tokio::spawn(async move {
            while let Some(mut block) = rx.recv().await {
                sink.lock().append(&mut block);
            }
        });

        if let Err(e) = self.capture.start(tx).await {
            collector.abort();
            self.turn.lock().end_recording();
            return Err(e);
        }

        *self.active.lock() = Some(ActiveRecording { samples, collector });

        if interrupted {
            Ok(RecordingStart::Interrupted {
                timestamp: epoch_millis(),
            })
        } else {
            Ok(RecordingStart::Started)
        }
    }

    /// Stop recording and package the speech as one mono 16 kHz WAV turn.
    ///
    /// Returns `None` when nothing was recorded (no active recording, or the
    /// device delivered no samples).
    pub async fn stop_recording(&self) -> AudioResult<Option<Vec<u8>>> {
        let Some(active) = self.active.lock().take() else {
            return Ok(None);
        };

        // The turn ends whether or not the device stops cleanly; a tracker
        // stuck in Recording would block every later barge-in.
        let stopped = self.capture.stop().await;
        self.turn.lock().end_recording();
        if let Err(e) = stopped {
            active.collector.abort();
            return Err(e);
        }

        // Sender side is gone after stop; the collector drains and exits.
        active
            .collector
            .await
            .map_err(|e| AudioError::Capture(format!("sample collector failed: {e}")))?;

        let samples = std::mem::take(&mut *active.samples.lock());
        if samples.is_empty() {
            debug!("Recording stopped with no samples captured");
            return Ok(None);
        }

        Ok(Some(convert::encode_capture(
            &samples,
            self.capture.sample_rate(),
        )))
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
