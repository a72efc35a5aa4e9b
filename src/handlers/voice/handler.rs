//! Voice WebSocket handler
//!
//! One socket maps to one dialogue stream. The handler opens the model
//! stream on upgrade, then runs a single event loop interleaving client
//! frames, model events, and an idle check. Response audio is forwarded as
//! it arrives: an `audio` control message announcing each chunk, then the
//! chunk itself as a binary frame.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use crate::core::audio::convert;
use crate::core::dialogue::{DialogueConfig, DialogueEvent, StreamSession};
use crate::state::AppState;

use super::messages::{ControlMessage, VoiceRoute};

/// Optimized channel buffer size for audio workloads
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How often the idle check runs
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Voice WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket and binds it to a fresh
/// dialogue stream.
pub async fn voice_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("Voice WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_voice_socket(socket, state))
}

/// Handle the voice WebSocket connection
async fn handle_voice_socket(socket: WebSocket, state: AppState) {
    info!("Voice WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<VoiceRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let should_close = matches!(route, VoiceRoute::Close);

            let result = match route {
                VoiceRoute::Control(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize control message: {}", e);
                        continue;
                    }
                },
                VoiceRoute::Audio(data) => sender.send(Message::Binary(data)).await,
                VoiceRoute::Close => {
                    info!("Closing voice WebSocket connection");
                    sender.send(Message::Close(None)).await
                }
            };

            if let Err(e) = result {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    // A stream cannot open without credentials; reject before dialing.
    let Some(api_key) = state.config.gemini_api_key.clone() else {
        error!("Rejecting connection: no API key configured");
        let _ = route_tx
            .send(VoiceRoute::Control(ControlMessage::Error {
                message: "Server is not configured with a model API key".to_string(),
            }))
            .await;
        finish(route_tx, sender_task).await;
        return;
    };

    let dialogue_config = DialogueConfig {
        api_key,
        model: state.config.model.clone(),
        voice: state.config.voice.clone(),
        language_code: state.config.language_code.clone(),
        system_instruction: state.config.system_instruction.clone(),
        context_trigger_tokens: state.config.context_trigger_tokens,
        context_target_tokens: state.config.context_target_tokens,
        endpoint: state.config.gemini_endpoint.clone(),
    };

    let connect_timeout = Duration::from_secs(state.config.connect_timeout_secs);
    let (session, mut events) = match StreamSession::open(dialogue_config, connect_timeout).await {
        Ok(opened) => opened,
        Err(e) => {
            error!("Failed to open model stream: {}", e);
            let _ = route_tx
                .send(VoiceRoute::Control(ControlMessage::Error {
                    message: format!("Failed to open model stream: {e}"),
                }))
                .await;
            finish(route_tx, sender_task).await;
            return;
        }
    };

    let session_id = state.sessions.insert(state.config.model.clone());
    info!(%session_id, "Dialogue stream open");

    let _ = route_tx
        .send(VoiceRoute::Control(ControlMessage::Status {
            message: "Connected to Gemini Live".to_string(),
        }))
        .await;
    let _ = route_tx
        .send(VoiceRoute::Control(ControlMessage::Status {
            message: "Setup complete".to_string(),
        }))
        .await;

    // Maximum idle time before closing, with ±10% jitter so a fleet of
    // stale connections does not all close on the same tick
    let base_idle_secs = state.config.idle_timeout_secs;
    let jitter_range = (base_idle_secs / 10).max(1);
    let jitter_offset =
        (std::time::Instant::now().elapsed().as_nanos() as u64 % (jitter_range * 2)) as i64
            - jitter_range as i64;
    let idle_timeout = Duration::from_secs((base_idle_secs as i64 + jitter_offset).max(1) as u64);

    let mut last_activity = std::time::Instant::now();

    loop {
        select! {
            msg_result = receiver.next() => {
                last_activity = std::time::Instant::now();

                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_client_message(msg, &session, &route_tx).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Voice WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!("Voice WebSocket connection closed by client");
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Some(event) => {
                        last_activity = std::time::Instant::now();
                        if !forward_dialogue_event(event, session.generation(), &route_tx).await {
                            break;
                        }
                    }
                    None => {
                        info!("Model event stream ended");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {
                if last_activity.elapsed() > idle_timeout {
                    warn!(
                        "Voice connection idle for {}s, closing stale connection",
                        last_activity.elapsed().as_secs()
                    );
                    let _ = route_tx
                        .send(VoiceRoute::Control(ControlMessage::Error {
                            message: "Connection closed due to inactivity".to_string(),
                        }))
                        .await;
                    break;
                }
                debug!("Voice connection idle check - still active");
            }
        }
    }

    // Cleanup
    state.sessions.remove(&session_id);
    session.close().await;
    finish(route_tx, sender_task).await;

    info!(%session_id, "Voice WebSocket connection terminated");
}

/// Flush a close frame and wind down the sender task.
async fn finish(route_tx: mpsc::Sender<VoiceRoute>, sender_task: tokio::task::JoinHandle<()>) {
    let _ = route_tx.send(VoiceRoute::Close).await;
    drop(route_tx);
    if tokio::time::timeout(Duration::from_secs(1), sender_task)
        .await
        .is_err()
    {
        warn!("Sender task did not drain in time");
    }
}

/// Process one incoming client frame. Returns `false` to end the session.
async fn process_client_message(
    msg: Message,
    session: &StreamSession,
    route_tx: &mpsc::Sender<VoiceRoute>,
) -> bool {
    match msg {
        Message::Text(text) => {
            let control: ControlMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Unparseable control message: {}", e);
                    let _ = route_tx
                        .send(VoiceRoute::Control(ControlMessage::Error {
                            message: format!("Invalid message format: {e}"),
                        }))
                        .await;
                    return true;
                }
            };

            if let Err(e) = control.validate_size() {
                warn!("Control message validation failed: {}", e);
                let _ = route_tx
                    .send(VoiceRoute::Control(ControlMessage::Error {
                        message: e.to_string(),
                    }))
                    .await;
                return true;
            }

            handle_control_message(control, session, route_tx).await
        }

        Message::Binary(data) => {
            debug!("Received utterance: {} bytes", data.len());

            // One binary frame is one complete user turn.
            let (mime_type, pcm) = convert::classify_payload(&data);
            if let Err(e) = session.submit_audio(&mime_type, pcm).await {
                warn!("Failed to submit audio turn: {}", e);
                let _ = route_tx
                    .send(VoiceRoute::Control(ControlMessage::Error {
                        message: format!("Failed to submit audio: {e}"),
                    }))
                    .await;
            }
            true
        }

        Message::Ping(_) | Message::Pong(_) => true,

        Message::Close(_) => {
            info!("Voice WebSocket close received");
            false
        }
    }
}

/// Handle one typed client control message. Returns `false` to end the session.
async fn handle_control_message(
    msg: ControlMessage,
    session: &StreamSession,
    route_tx: &mpsc::Sender<VoiceRoute>,
) -> bool {
    match msg {
        ControlMessage::Text { text } => {
            if let Err(e) = session.submit_text(&text).await {
                warn!("Failed to submit text turn: {}", e);
                let _ = route_tx
                    .send(VoiceRoute::Control(ControlMessage::Error {
                        message: format!("Failed to submit text: {e}"),
                    }))
                    .await;
            }
            true
        }

        ControlMessage::Interrupt { timestamp } => {
            let generation = session.interrupt();
            debug!(timestamp, generation, "Client interrupted response");
            true
        }

        ControlMessage::AudioWithTimestamp { timestamp } => {
            // Announces the binary utterance that follows; nothing to do yet
            debug!(timestamp, "Utterance announced");
            true
        }

        // Server-to-client variants have no meaning inbound
        other => {
            debug!("Ignoring client control message: {:?}", other);
            true
        }
    }
}

/// Forward one model event to the client. `current_generation` is the
/// session's latest interruption generation. Returns `false` to end the
/// session.
async fn forward_dialogue_event(
    event: DialogueEvent,
    current_generation: u64,
    route_tx: &mpsc::Sender<VoiceRoute>,
) -> bool {
    match event {
        DialogueEvent::Audio { data, generation } => {
            // Audio received before the latest interruption is stale
            if generation < current_generation {
                debug!("Dropping {} bytes of stale response audio", data.len());
                return true;
            }
            if route_tx
                .send(VoiceRoute::Control(ControlMessage::Audio))
                .await
                .is_err()
            {
                return false;
            }
            route_tx.send(VoiceRoute::Audio(data)).await.is_ok()
        }

        DialogueEvent::Text(text) => route_tx
            .send(VoiceRoute::Control(ControlMessage::Text { text }))
            .await
            .is_ok(),

        DialogueEvent::TurnComplete => route_tx
            .send(VoiceRoute::Control(ControlMessage::Status {
                message: "Turn complete".to_string(),
            }))
            .await
            .is_ok(),

        DialogueEvent::Interrupted => route_tx
            .send(VoiceRoute::Control(ControlMessage::Status {
                message: "Interrupted".to_string(),
            }))
            .await
            .is_ok(),

        DialogueEvent::SetupComplete => {
            // Consumed during open; a duplicate is harmless
            true
        }

        DialogueEvent::Errored(e) => {
            error!("Model stream error: {}", e);
            let _ = route_tx
                .send(VoiceRoute::Control(ControlMessage::Error {
                    message: format!("Model stream error: {e}"),
                }))
                .await;
            false
        }

        DialogueEvent::Closed(reason) => {
            let reason = reason.unwrap_or_else(|| "no reason given".to_string());
            info!("Model stream closed: {}", reason);
            let _ = route_tx
                .send(VoiceRoute::Control(ControlMessage::Error {
                    message: format!("Model stream closed: {reason}"),
                }))
                .await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_stale_audio_dropped_after_interruption() {
        let (tx, mut rx) = mpsc::channel(8);

        // Chunk stamped under generation 0, session since interrupted to 1
        let keep_going = forward_dialogue_event(
            DialogueEvent::Audio {
                data: Bytes::from_static(&[1, 0]),
                generation: 0,
            },
            1,
            &tx,
        )
        .await;

        assert!(keep_going);
        drop(tx);
        // Neither the audio announce nor the binary frame reach the client
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_current_audio_forwarded_as_announce_then_binary() {
        let (tx, mut rx) = mpsc::channel(8);

        assert!(
            forward_dialogue_event(
                DialogueEvent::Audio {
                    data: Bytes::from_static(&[9, 0]),
                    generation: 1,
                },
                1,
                &tx,
            )
            .await
        );

        assert!(matches!(
            rx.recv().await.unwrap(),
            VoiceRoute::Control(ControlMessage::Audio)
        ));
        match rx.recv().await.unwrap() {
            VoiceRoute::Audio(data) => assert_eq!(&data[..], &[9, 0]),
            _ => panic!("expected the binary frame after the announce"),
        }
    }
}
