//! HTTP and WebSocket request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Health check endpoint
//! - `voice` - Voice relay WebSocket (Gemini Live)

pub mod api;
pub mod voice;

// Re-export commonly used handlers for convenient access
pub use voice::voice_handler;
