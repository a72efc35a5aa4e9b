//! Base types for streaming speech-dialogue backends.
//!
//! A dialogue backend holds one bidirectional stream to a cloud model:
//! text and audio turns go up, audio (and optionally text) comes back.
//! Backends surface everything that happens on the stream as a single
//! ordered sequence of [`DialogueEvent`]s on a channel, consumed by one
//! loop per session.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on a dialogue stream.
#[derive(Debug, Error)]
pub enum DialogueError {
    /// Connection to the model endpoint failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Missing or rejected credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The model reported an error
    #[error("Model error: {0}")]
    ModelError(String),

    /// Message could not be serialized or parsed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Stream is not open
    #[error("Not connected")]
    NotConnected,
}

/// Result type for dialogue operations.
pub type DialogueResult<T> = Result<T, DialogueError>;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a dialogue stream.
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// API key for authentication
    pub api_key: String,

    /// Model identifier, e.g. "models/gemini-live-2.5-flash-preview"
    pub model: String,

    /// Prebuilt voice name for audio responses
    pub voice: String,

    /// Language code for speech synthesis
    pub language_code: String,

    /// System instruction constraining assistant behavior
    pub system_instruction: Option<String>,

    /// Context-window compression trigger threshold (tokens)
    pub context_trigger_tokens: u32,

    /// Context-window compression sliding-window target (tokens)
    pub context_target_tokens: u32,

    /// Endpoint override; `None` uses the production endpoint. Set by tests
    /// to point at a local mock server.
    pub endpoint: Option<String>,
}

impl DialogueConfig {
    pub fn validate(&self) -> DialogueResult<()> {
        if self.api_key.is_empty() {
            return Err(DialogueError::InvalidConfiguration(
                "api_key must not be empty".to_string(),
            ));
        }
        if self.model.is_empty() {
            return Err(DialogueError::InvalidConfiguration(
                "model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of a dialogue stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// WebSocket dial and setup exchange in progress
    #[default]
    Connecting,
    /// Stream is open and accepting turns
    Open,
    /// Close requested, teardown in progress
    Closing,
    /// Stream is gone
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Open => write!(f, "Open"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Everything a dialogue stream can report, in arrival order.
///
/// Audio events carry the interruption generation they were received under;
/// consumers drop audio stamped with a generation older than the latest
/// interruption.
#[derive(Debug)]
pub enum DialogueEvent {
    /// Transport connected and setup accepted by the model
    SetupComplete,
    /// One chunk of response audio (raw mono 16-bit PCM at 24 kHz)
    Audio { data: Bytes, generation: u64 },
    /// Response text, when the model produces any
    Text(String),
    /// The model finished its turn
    TurnComplete,
    /// The model abandoned its turn after detecting user speech
    Interrupted,
    /// Stream-level failure; the stream is unusable after this
    Errored(DialogueError),
    /// The model closed the stream, with its reason if it gave one
    Closed(Option<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DialogueConfig {
        DialogueConfig {
            api_key: "key".to_string(),
            model: "models/test".to_string(),
            voice: "Puck".to_string(),
            language_code: "en-IN".to_string(),
            system_instruction: None,
            context_trigger_tokens: 25_600,
            context_target_tokens: 12_800,
            endpoint: None,
        }
    }

    #[test]
    fn test_config_requires_api_key() {
        let mut c = config();
        c.api_key.clear();
        assert!(matches!(
            c.validate(),
            Err(DialogueError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_config_requires_model() {
        let mut c = config();
        c.model.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Connecting.to_string(), "Connecting");
        assert_eq!(SessionState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_error_display() {
        let err = DialogueError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("Connection failed"));
        assert_eq!(DialogueError::NotConnected.to_string(), "Not connected");
    }
}
