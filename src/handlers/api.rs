//! Health check endpoint

use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
}

/// Liveness probe. Reports the number of open voice sessions.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.sessions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[tokio::test]
    async fn test_health_reports_session_count() {
        let state = AppState::new(ServerConfig::default());
        state.sessions.insert("models/test".to_string());

        let Json(body) = health_check(State(state)).await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.active_sessions, 1);
    }
}
