//! Wire messages for the Gemini Live bidirectional streaming API.
//!
//! The protocol is JSON over WebSocket. A client message carries exactly one
//! of `setup` or `clientContent`; a server message carries one of
//! `setupComplete` or `serverContent`. Binary audio travels inside
//! `inlineData` parts as base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::core::dialogue::base::DialogueConfig;

// =============================================================================
// Shared content types
// =============================================================================

/// One part of a turn: either text or inline binary data, never both.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data: BASE64.encode(data),
            }),
            ..Default::default()
        }
    }
}

/// Base64-wrapped binary payload with its MIME tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

impl Blob {
    /// Decode the base64 payload.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

// =============================================================================
// Client -> server
// =============================================================================

/// First message on the stream; configures model, voice, and compression.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    pub context_window_compression: ContextWindowCompression,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
    pub language_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Token thresholds travel as decimal strings on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindowCompression {
    pub trigger_tokens: String,
    pub sliding_window: SlidingWindow,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlidingWindow {
    pub target_tokens: String,
}

impl SetupMessage {
    pub fn new(config: &DialogueConfig) -> Self {
        Self {
            setup: Setup {
                model: config.model.clone(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: config.voice.clone(),
                            },
                        },
                        language_code: config.language_code.clone(),
                    },
                },
                system_instruction: config.system_instruction.as_ref().map(|text| Content {
                    role: None,
                    parts: vec![Part::text(text.clone())],
                }),
                context_window_compression: ContextWindowCompression {
                    trigger_tokens: config.context_trigger_tokens.to_string(),
                    sliding_window: SlidingWindow {
                        target_tokens: config.context_target_tokens.to_string(),
                    },
                },
            },
        }
    }
}

/// One complete user turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContentMessage {
    pub client_content: ClientContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

impl ClientContentMessage {
    fn user_turn(parts: Vec<Part>) -> Self {
        Self {
            client_content: ClientContent {
                turns: vec![Content {
                    role: Some("user".to_string()),
                    parts,
                }],
                turn_complete: true,
            },
        }
    }

    /// A complete text turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self::user_turn(vec![Part::text(text)])
    }

    /// A complete audio turn. `mime_type` declares the PCM rate.
    pub fn audio(mime_type: impl Into<String>, pcm: &[u8]) -> Self {
        Self::user_turn(vec![Part::inline_data(mime_type, pcm)])
    }
}

// =============================================================================
// Server -> client
// =============================================================================

/// A server message; exactly one of the optional fields is populated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,

    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,

    #[serde(default)]
    pub turn_complete: Option<bool>,

    #[serde(default)]
    pub interrupted: Option<bool>,
}
