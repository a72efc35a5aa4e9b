//! Server Startup Tests
//!
//! Tests for router assembly, configuration loading, and startup behavior.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use voicegate::config::ServerConfig;
use voicegate::routes;
use voicegate::state::AppState;

fn test_app() -> axum::Router {
    routes::create_voice_router().with_state(AppState::new(ServerConfig::default()))
}

#[tokio::test]
async fn test_health_endpoint_responds() {
    let response = test_app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["active_sessions"], 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ws_route_requires_upgrade() {
    // A plain GET without upgrade headers must not be treated as a socket
    let response = test_app()
        .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_server_binds_and_accepts() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, test_app()).await.unwrap();
    });

    let stream = tokio::net::TcpStream::connect(addr).await;
    assert!(stream.is_ok(), "server should accept TCP connections");
}

#[test]
fn test_config_without_key_is_still_valid() {
    // The server boots without credentials; sessions are rejected at
    // connection time instead
    let config = ServerConfig::default();
    assert!(config.gemini_api_key.is_none());
    assert!(config.validate().is_ok());
}
