//! Voice WebSocket route configuration
//!
//! This module configures the WebSocket endpoint that relays audio between
//! browser clients and the dialogue model.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api::health_check;
use crate::handlers::voice::voice_handler;
use crate::state::AppState;

/// Create the voice router
///
/// # Endpoints
///
/// - `GET /ws` - WebSocket upgrade for voice relay
/// - `GET /health` - liveness probe
///
/// # Protocol
///
/// After WebSocket upgrade:
/// - Client sends JSON control frames (`text`, `interrupt`,
///   `audio_with_timestamp`) and binary WAV utterances.
/// - Server sends `status`/`error`/`text` control frames, and response audio
///   as an `audio` control frame followed by a binary frame of raw PCM
///   (16-bit mono, 24 kHz).
///
/// # Example
///
/// ```json
/// // Client sends a text turn
/// {"type": "text", "text": "What's the weather like?"}
///
/// // Server announces audio, then sends a binary PCM frame
/// {"type": "audio"}
///
/// // Model finishes its turn
/// {"type": "status", "message": "Turn complete"}
/// ```
pub fn create_voice_router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(voice_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}
