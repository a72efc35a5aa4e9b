//! Gemini Live WebSocket client.
//!
//! One client holds one bidirectional stream. Outgoing turns go through a
//! bounded channel to a single writer inside the connection task; everything
//! the model sends back is translated into [`DialogueEvent`]s on the channel
//! returned from [`GeminiClient::connect`].
//!
//! # Interruption
//!
//! The Live API has no cancel frame for an in-flight turn. Interruption is
//! local: [`GeminiClient::interrupt`] bumps a generation counter, and audio
//! received before the bump carries the old generation so consumers can drop
//! it. Audio from the next turn carries the new generation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::config::ws_url;
use super::messages::{ClientContentMessage, ServerMessage, SetupMessage};
use crate::core::dialogue::base::{
    DialogueConfig, DialogueError, DialogueEvent, DialogueResult,
};

/// Capacity of the outgoing frame channel.
const OUTBOUND_CAPACITY: usize = 256;

/// Capacity of the event channel handed to the consumer.
const EVENT_CAPACITY: usize = 1024;

enum OutboundFrame {
    Json(String),
    Close,
}

/// Client for one Gemini Live stream.
pub struct GeminiClient {
    connected: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    outbound: mpsc::Sender<OutboundFrame>,
    task: JoinHandle<()>,
}

impl GeminiClient {
    /// Dial the endpoint, send setup, and return the client paired with its
    /// event stream. The first event on a healthy stream is
    /// [`DialogueEvent::SetupComplete`].
    pub async fn connect(
        config: DialogueConfig,
    ) -> DialogueResult<(Self, mpsc::Receiver<DialogueEvent>)> {
        config.validate()?;

        let url = ws_url(&config);
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| DialogueError::ConnectionFailed(e.to_string()))?;
        tracing::info!(model = %config.model, "Connected to Gemini Live");

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        // Setup goes out before anything else can be queued.
        let setup = serde_json::to_string(&SetupMessage::new(&config))
            .map_err(|e| DialogueError::SerializationError(e.to_string()))?;
        ws_sink
            .send(Message::Text(setup.into()))
            .await
            .map_err(|e| DialogueError::WebSocketError(e.to_string()))?;

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<DialogueEvent>(EVENT_CAPACITY);

        let connected = Arc::new(AtomicBool::new(true));
        let generation = Arc::new(AtomicU64::new(0));

        let task_connected = Arc::clone(&connected);
        let task_generation = Arc::clone(&generation);

        let task = tokio::spawn(async move {
            let mut close_reason: Option<String> = None;

            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => {
                        match frame {
                            Some(OutboundFrame::Json(json)) => {
                                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                    tracing::error!("Failed to send to model: {e}");
                                    let _ = event_tx
                                        .send(DialogueEvent::Errored(
                                            DialogueError::WebSocketError(e.to_string()),
                                        ))
                                        .await;
                                    break;
                                }
                            }
                            Some(OutboundFrame::Close) | None => {
                                let _ = ws_sink.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }

                    msg = ws_source.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(message) => {
                                        dispatch_server_message(
                                            message,
                                            &event_tx,
                                            &task_generation,
                                        )
                                        .await;
                                    }
                                    Err(e) => {
                                        tracing::warn!("Unparseable model message: {e}");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                close_reason = frame.map(|f| f.reason.to_string());
                                tracing::info!("Model closed the stream");
                                break;
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {e}");
                                    break;
                                }
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::error!("Model stream error: {e}");
                                let _ = event_tx
                                    .send(DialogueEvent::Errored(
                                        DialogueError::WebSocketError(e.to_string()),
                                    ))
                                    .await;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }

            task_connected.store(false, Ordering::SeqCst);
            let _ = event_tx.send(DialogueEvent::Closed(close_reason)).await;
        });

        Ok((
            Self {
                connected,
                generation,
                outbound: outbound_tx,
                task,
            },
            event_rx,
        ))
    }

    /// Whether the stream is still up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Current interruption generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Send one complete text turn.
    pub async fn send_text(&self, text: &str) -> DialogueResult<()> {
        self.send_json(&ClientContentMessage::text(text)).await
    }

    /// Send one complete audio turn. `mime_type` declares the PCM rate.
    pub async fn send_audio(&self, mime_type: &str, pcm: &[u8]) -> DialogueResult<()> {
        self.send_json(&ClientContentMessage::audio(mime_type, pcm))
            .await
    }

    /// Invalidate all response audio received so far. Returns the new
    /// generation; audio events stamped with an older one are stale.
    pub fn interrupt(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, "Response audio invalidated");
        generation
    }

    /// Close the stream. Idempotent.
    pub async fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(OutboundFrame::Close).await;
        }
    }

    async fn send_json<T: serde::Serialize>(&self, message: &T) -> DialogueResult<()> {
        if !self.is_connected() {
            return Err(DialogueError::NotConnected);
        }
        let json = serde_json::to_string(message)
            .map_err(|e| DialogueError::SerializationError(e.to_string()))?;
        self.outbound
            .send(OutboundFrame::Json(json))
            .await
            .map_err(|_| DialogueError::NotConnected)
    }
}

impl Drop for GeminiClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Translate one server message into events, stamping audio with the
/// generation current at receipt.
async fn dispatch_server_message(
    message: ServerMessage,
    events: &mpsc::Sender<DialogueEvent>,
    generation: &AtomicU64,
) {
    if message.setup_complete.is_some() {
        let _ = events.send(DialogueEvent::SetupComplete).await;
    }

    let Some(content) = message.server_content else {
        return;
    };

    if content.interrupted == Some(true) {
        let _ = events.send(DialogueEvent::Interrupted).await;
    }

    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            if let Some(blob) = part.inline_data {
                match blob.decode() {
                    Ok(data) => {
                        let _ = events
                            .send(DialogueEvent::Audio {
                                data: Bytes::from(data),
                                generation: generation.load(Ordering::SeqCst),
                            })
                            .await;
                    }
                    Err(e) => tracing::warn!("Undecodable audio part: {e}"),
                }
            }
            if let Some(text) = part.text {
                let _ = events.send(DialogueEvent::Text(text)).await;
            }
        }
    }

    if content.turn_complete == Some(true) {
        let _ = events.send(DialogueEvent::TurnComplete).await;
    }
}
