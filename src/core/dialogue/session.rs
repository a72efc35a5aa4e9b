//! Session lifecycle around one dialogue stream.
//!
//! A [`StreamSession`] owns its [`GeminiClient`] exclusively; nothing else
//! in the process can reach the underlying connection. Opening a session is
//! all-or-nothing: the stream must dial, deliver setup, and acknowledge it
//! within the connect timeout, or the session never existed.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::base::{
    DialogueConfig, DialogueError, DialogueEvent, DialogueResult, SessionState,
};
use super::gemini::GeminiClient;

/// One open dialogue stream and its lifecycle state.
pub struct StreamSession {
    client: GeminiClient,
    state: Mutex<SessionState>,
}

impl StreamSession {
    /// Open a stream and wait for the model to acknowledge setup.
    ///
    /// Returns the session paired with its event stream. The
    /// `SetupComplete` event is consumed here as the open handshake; the
    /// first events the caller sees are response events.
    pub async fn open(
        config: DialogueConfig,
        connect_timeout: Duration,
    ) -> DialogueResult<(Self, mpsc::Receiver<DialogueEvent>)> {
        let connect = async {
            let (client, mut events) = GeminiClient::connect(config).await?;

            // The stream is not usable until the model accepts setup.
            match events.recv().await {
                Some(DialogueEvent::SetupComplete) => Ok((client, events)),
                Some(DialogueEvent::Errored(e)) => Err(e),
                Some(DialogueEvent::Closed(reason)) => Err(DialogueError::ConnectionFailed(
                    reason.unwrap_or_else(|| "stream closed during setup".to_string()),
                )),
                Some(other) => Err(DialogueError::ModelError(format!(
                    "unexpected message before setup acknowledgement: {other:?}"
                ))),
                None => Err(DialogueError::ConnectionFailed(
                    "stream ended during setup".to_string(),
                )),
            }
        };

        let (client, events) = tokio::time::timeout(connect_timeout, connect)
            .await
            .map_err(|_| {
                DialogueError::Timeout(format!(
                    "model stream did not open within {}s",
                    connect_timeout.as_secs()
                ))
            })??;

        Ok((
            Self {
                client,
                state: Mutex::new(SessionState::Open),
            },
            events,
        ))
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Current interruption generation; audio events stamped with an older
    /// one are stale.
    pub fn generation(&self) -> u64 {
        self.client.generation()
    }

    /// Submit one complete text turn.
    pub async fn submit_text(&self, text: &str) -> DialogueResult<()> {
        self.ensure_open()?;
        self.client.send_text(text).await
    }

    /// Submit one complete audio turn.
    pub async fn submit_audio(&self, mime_type: &str, pcm: &[u8]) -> DialogueResult<()> {
        self.ensure_open()?;
        self.client.send_audio(mime_type, pcm).await
    }

    /// Invalidate in-flight response audio. Returns the new generation.
    pub fn interrupt(&self) -> u64 {
        self.client.interrupt()
    }

    /// Close the stream. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed || *state == SessionState::Closing {
                return;
            }
            *state = SessionState::Closing;
        }
        self.client.close().await;
        *self.state.lock() = SessionState::Closed;
    }

    fn ensure_open(&self) -> DialogueResult<()> {
        if *self.state.lock() == SessionState::Open && self.client.is_connected() {
            Ok(())
        } else {
            Err(DialogueError::NotConnected)
        }
    }
}
