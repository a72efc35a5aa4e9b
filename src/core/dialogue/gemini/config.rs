//! Endpoint configuration for the Gemini Live API.

use crate::core::dialogue::base::DialogueConfig;

/// Production WebSocket endpoint for bidirectional generation.
pub const GEMINI_LIVE_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Build the WebSocket URL for a stream. The API key travels as a query
/// parameter; `endpoint` overrides the host for tests.
pub fn ws_url(config: &DialogueConfig) -> String {
    let base = config.endpoint.as_deref().unwrap_or(GEMINI_LIVE_URL);
    format!("{}?key={}", base, config.api_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DialogueConfig {
        DialogueConfig {
            api_key: "secret".to_string(),
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
    fn test_production_url_carries_key() {
        let url = ws_url(&config());
        assert!(url.starts_with("wss://generativelanguage.googleapis.com/"));
        assert!(url.ends_with("?key=secret"));
    }

    #[test]
    fn test_endpoint_override() {
        let mut c = config();
        c.endpoint = Some("ws://127.0.0.1:9000/live".to_string());
        assert_eq!(ws_url(&c), "ws://127.0.0.1:9000/live?key=secret");
    }
}
