//! Voice WebSocket endpoint: handler and message types.

pub mod handler;
pub mod messages;

pub use handler::voice_handler;
pub use messages::{ControlMessage, VoiceRoute};
