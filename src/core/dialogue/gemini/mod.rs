//! Gemini Live backend.

pub mod client;
pub mod config;
pub mod messages;

pub use client::GeminiClient;
pub use config::GEMINI_LIVE_URL;
