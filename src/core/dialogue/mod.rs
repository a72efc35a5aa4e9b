//! Streaming speech-dialogue backends and session lifecycle.

pub mod base;
pub mod gemini;
pub mod session;

pub use base::{
    DialogueConfig, DialogueError, DialogueEvent, DialogueResult, SessionState,
};
pub use gemini::GeminiClient;
pub use session::StreamSession;
