//! Client-side audio pipeline: format conversion, debounced playback,
//! capture control, and conversational turn tracking.

pub mod capture;
pub mod convert;
pub mod playback;
pub mod turn;

use thiserror::Error;

pub use capture::{AudioCapture, CaptureController};
pub use playback::{AudioOutput, PlaybackBuffer, PlayableBuffer};
pub use turn::{TurnState, TurnTracker};

/// Errors from the audio pipeline.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Payload is too short or structurally invalid for its declared format
    #[error("Malformed audio payload: {0}")]
    Malformed(String),

    /// WAV header declares a format the pipeline does not handle
    #[error("Unsupported audio format: {0}")]
    Unsupported(String),

    /// Capture device failure
    #[error("Capture error: {0}")]
    Capture(String),

    /// Playback device failure
    #[error("Playback error: {0}")]
    Playback(String),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;
