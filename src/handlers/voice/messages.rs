//! Voice WebSocket control messages
//!
//! The client protocol carries two kinds of frames: binary frames holding
//! raw audio, and JSON text frames holding typed control messages. A control
//! message with an announce variant (`audio`, `audio_with_timestamp`) tells
//! the peer that the next binary frame is audio and what it means.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Maximum allowed size for a text turn (50 KB)
pub const MAX_TEXT_SIZE: usize = 50 * 1024;

/// Control messages, both directions.
///
/// Client to server: `text`, `interrupt`, `audio_with_timestamp`.
/// Server to client: `status`, `error`, `audio`, `text`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Informational state change (connected, setup complete, turn complete)
    #[serde(rename = "status")]
    Status { message: String },

    /// Something went wrong; may precede a close
    #[serde(rename = "error")]
    Error { message: String },

    /// The next binary frame is response audio
    #[serde(rename = "audio")]
    Audio,

    /// The user barged in while a response was playing. `timestamp` is
    /// epoch milliseconds of the barge-in.
    #[serde(rename = "interrupt")]
    Interrupt { timestamp: u64 },

    /// A complete text turn
    #[serde(rename = "text")]
    Text { text: String },

    /// The next binary frame is one complete recorded utterance. `timestamp`
    /// is epoch milliseconds of when recording stopped.
    #[serde(rename = "audio_with_timestamp")]
    AudioWithTimestamp { timestamp: u64 },
}

/// Error type for message validation failures
#[derive(Debug, Clone)]
pub enum VoiceValidationError {
    /// Text turn exceeds maximum allowed size
    TextTooLarge { size: usize, max: usize },
}

impl std::fmt::Display for VoiceValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextTooLarge { size, max } => {
                write!(f, "Text too large: {} bytes (max: {} bytes)", size, max)
            }
        }
    }
}

impl std::error::Error for VoiceValidationError {}

impl ControlMessage {
    /// Validates field sizes to prevent resource exhaustion.
    pub fn validate_size(&self) -> Result<(), VoiceValidationError> {
        match self {
            ControlMessage::Text { text } => {
                let size = text.len();
                if size > MAX_TEXT_SIZE {
                    return Err(VoiceValidationError::TextTooLarge {
                        size,
                        max: MAX_TEXT_SIZE,
                    });
                }
            }
            // No user-sized payloads in the other variants
            ControlMessage::Status { .. }
            | ControlMessage::Error { .. }
            | ControlMessage::Audio
            | ControlMessage::Interrupt { .. }
            | ControlMessage::AudioWithTimestamp { .. } => {}
        }
        Ok(())
    }
}

/// Message routing for the socket sender task.
pub enum VoiceRoute {
    /// JSON control message
    Control(ControlMessage),
    /// Binary audio data
    Audio(Bytes),
    /// Close connection
    Close,
}
