//! End-to-end tests for the voice WebSocket relay
//!
//! A real client socket talks to the real server, which talks to a local
//! scripted stand-in for the model endpoint. Covers the full relay path:
//! control frames, binary utterances, response audio framing, and teardown.

use std::net::SocketAddr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use voicegate::config::ServerConfig;
use voicegate::core::audio::convert;
use voicegate::routes;
use voicegate::state::AppState;

type Ws = WebSocketStream<TcpStream>;
type ClientWs = WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

/// Spawn a one-connection scripted model endpoint. Returns its ws:// URL.
async fn spawn_mock_model<F, Fut>(script: F) -> String
where
    F: FnOnce(Ws) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("mock handshake failed");
            script(ws).await;
        }
    });
    format!("ws://{addr}/")
}

/// Start the server on an ephemeral port.
async fn start_server(config: ServerConfig) -> SocketAddr {
    let state = AppState::new(config);
    let app = routes::create_voice_router().with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect_client(addr: SocketAddr) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("client connect failed");
    ws
}

/// Next JSON control frame from the server, skipping everything else.
async fn next_control(ws: &mut ClientWs) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for control frame")
            .expect("server hung up")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Next frame of any kind, with a timeout.
async fn next_frame(ws: &mut ClientWs) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("server hung up")
        .unwrap()
}

async fn mock_send(ws: &mut Ws, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn mock_next_text(ws: &mut Ws) -> serde_json::Value {
    loop {
        match ws.next().await.expect("server side hung up").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(data) => {
                let _ = ws.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }
}

fn audio_content(pcm: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "serverContent": {
            "modelTurn": {
                "parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": BASE64.encode(pcm)}}
                ]
            }
        }
    })
}

fn server_config(endpoint: String) -> ServerConfig {
    ServerConfig {
        gemini_api_key: Some("test-key".to_string()),
        gemini_endpoint: Some(endpoint),
        connect_timeout_secs: 5,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_rejected_without_api_key() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = connect_client(addr).await;

    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "error");
    assert!(
        control["message"]
            .as_str()
            .unwrap()
            .contains("not configured")
    );

    // Server closes after the error
    loop {
        match next_frame(&mut client).await {
            Message::Close(_) => break,
            Message::Text(_) | Message::Binary(_) => panic!("expected close"),
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_open_failure_reported_before_close() {
    // Endpoint that refuses the handshake: nothing is listening there
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", unused.local_addr().unwrap());
    drop(unused);

    let addr = start_server(server_config(endpoint)).await;
    let mut client = connect_client(addr).await;

    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "error");
    assert!(
        control["message"]
            .as_str()
            .unwrap()
            .contains("Failed to open model stream")
    );
}

#[tokio::test]
async fn test_recorded_utterance_full_turn() {
    let endpoint = spawn_mock_model(|mut ws| async move {
        let _setup = mock_next_text(&mut ws).await;
        mock_send(&mut ws, serde_json::json!({"setupComplete": {}})).await;

        // One complete audio turn arrives, already unwrapped from WAV
        let turn = mock_next_text(&mut ws).await;
        let content = &turn["clientContent"];
        assert_eq!(content["turnComplete"], true);
        let part = &content["turns"][0]["parts"][0]["inlineData"];
        assert_eq!(part["mimeType"], "audio/pcm;rate=16000");
        assert!(!part["data"].as_str().unwrap().is_empty());

        // Reply with two audio parts, then end of turn
        mock_send(&mut ws, audio_content(&[1, 0, 2, 0])).await;
        mock_send(&mut ws, audio_content(&[3, 0, 4, 0])).await;
        mock_send(
            &mut ws,
            serde_json::json!({"serverContent": {"turnComplete": true}}),
        )
        .await;
        while ws.next().await.is_some() {}
    })
    .await;

    let addr = start_server(server_config(endpoint)).await;
    let mut client = connect_client(addr).await;

    let control = next_control(&mut client).await;
    assert_eq!(control["message"], "Connected to Gemini Live");
    let control = next_control(&mut client).await;
    assert_eq!(control["message"], "Setup complete");

    // Announce and send one 2-second utterance as WAV
    client
        .send(Message::Text(
            r#"{"type":"audio_with_timestamp","timestamp":1724576000000}"#.into(),
        ))
        .await
        .unwrap();
    let samples = vec![0.1_f32; 32_000];
    let wav = convert::encode_capture(&samples, 16_000);
    client.send(Message::Binary(wav.into())).await.unwrap();

    // Strict ordering: audio, binary, audio, binary, status
    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "audio");
    match next_frame(&mut client).await {
        Message::Binary(data) => assert_eq!(&data[..], &[1, 0, 2, 0]),
        other => panic!("expected binary frame, got {other:?}"),
    }

    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "audio");
    match next_frame(&mut client).await {
        Message::Binary(data) => assert_eq!(&data[..], &[3, 0, 4, 0]),
        other => panic!("expected binary frame, got {other:?}"),
    }

    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "status");
    assert_eq!(control["message"], "Turn complete");
}

#[tokio::test]
async fn test_text_turn_relayed() {
    let endpoint = spawn_mock_model(|mut ws| async move {
        let _setup = mock_next_text(&mut ws).await;
        mock_send(&mut ws, serde_json::json!({"setupComplete": {}})).await;

        let turn = mock_next_text(&mut ws).await;
        assert_eq!(
            turn["clientContent"]["turns"][0]["parts"][0]["text"],
            "what's the weather?"
        );

        mock_send(
            &mut ws,
            serde_json::json!({
                "serverContent": {
                    "modelTurn": {"parts": [{"text": "sunny"}]},
                    "turnComplete": true
                }
            }),
        )
        .await;
        while ws.next().await.is_some() {}
    })
    .await;

    let addr = start_server(server_config(endpoint)).await;
    let mut client = connect_client(addr).await;
    next_control(&mut client).await; // connected
    next_control(&mut client).await; // setup complete

    client
        .send(Message::Text(
            r#"{"type":"text","text":"what's the weather?"}"#.into(),
        ))
        .await
        .unwrap();

    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "text");
    assert_eq!(control["text"], "sunny");

    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "status");
    assert_eq!(control["message"], "Turn complete");
}

#[tokio::test]
async fn test_interrupt_drops_in_flight_audio() {
    let endpoint = spawn_mock_model(|mut ws| async move {
        let _setup = mock_next_text(&mut ws).await;
        mock_send(&mut ws, serde_json::json!({"setupComplete": {}})).await;

        // First turn: respond with audio the client will interrupt
        let _turn = mock_next_text(&mut ws).await;
        mock_send(&mut ws, audio_content(&[1, 0])).await;

        // Wait for the second turn (sent after the interrupt), then answer.
        // Audio for this turn carries the bumped generation and must arrive.
        let _turn = mock_next_text(&mut ws).await;
        mock_send(&mut ws, audio_content(&[9, 0])).await;
        mock_send(
            &mut ws,
            serde_json::json!({"serverContent": {"turnComplete": true}}),
        )
        .await;
        while ws.next().await.is_some() {}
    })
    .await;

    let addr = start_server(server_config(endpoint)).await;
    let mut client = connect_client(addr).await;
    next_control(&mut client).await;
    next_control(&mut client).await;

    client
        .send(Message::Text(r#"{"type":"text","text":"first"}"#.into()))
        .await
        .unwrap();

    // First chunk arrives normally
    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "audio");
    assert!(matches!(next_frame(&mut client).await, Message::Binary(_)));

    // Barge in, then start the next turn
    client
        .send(Message::Text(
            r#"{"type":"interrupt","timestamp":1724576000500}"#.into(),
        ))
        .await
        .unwrap();
    client
        .send(Message::Text(r#"{"type":"text","text":"second"}"#.into()))
        .await
        .unwrap();

    // The next audio the client sees is the second turn's
    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "audio");
    match next_frame(&mut client).await {
        Message::Binary(data) => assert_eq!(&data[..], &[9, 0]),
        other => panic!("expected binary frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_control_frame_reports_error() {
    let endpoint = spawn_mock_model(|mut ws| async move {
        let _setup = mock_next_text(&mut ws).await;
        mock_send(&mut ws, serde_json::json!({"setupComplete": {}})).await;
        while ws.next().await.is_some() {}
    })
    .await;

    let addr = start_server(server_config(endpoint)).await;
    let mut client = connect_client(addr).await;
    next_control(&mut client).await;
    next_control(&mut client).await;

    client
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();

    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "error");
    assert!(
        control["message"]
            .as_str()
            .unwrap()
            .contains("Invalid message format")
    );
}

#[tokio::test]
async fn test_model_close_surfaces_error_and_teardown() {
    let endpoint = spawn_mock_model(|mut ws| async move {
        let _setup = mock_next_text(&mut ws).await;
        mock_send(&mut ws, serde_json::json!({"setupComplete": {}})).await;
        let _ = ws.send(Message::Close(None)).await;
    })
    .await;

    let addr = start_server(server_config(endpoint)).await;
    let mut client = connect_client(addr).await;
    next_control(&mut client).await;
    next_control(&mut client).await;

    let control = next_control(&mut client).await;
    assert_eq!(control["type"], "error");
    assert!(
        control["message"]
            .as_str()
            .unwrap()
            .contains("Model stream closed")
    );

    loop {
        match next_frame(&mut client).await {
            Message::Close(_) => break,
            Message::Binary(_) => panic!("unexpected audio after teardown"),
            _ => {}
        }
    }
}
