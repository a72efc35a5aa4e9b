//! Debounced playback of model audio.
//!
//! Model audio arrives as a burst of small PCM chunks. Playing each one as
//! it lands produces audible seams, so chunks are queued and flushed as one
//! concatenated buffer once the stream has been quiet for a short debounce
//! window. An interruption clears the queue and stops the device atomically
//! with respect to chunk arrival.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::convert::{self, MODEL_OUTPUT_RATE};
use super::AudioResult;
use crate::config::ServerConfig;

/// Decoded audio ready for a device.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Playback device abstraction.
///
/// `play` resolves when the buffer has finished playing (or the device gave
/// up); `stop` cuts off any buffer currently playing.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, buffer: PlayableBuffer) -> AudioResult<()>;
    async fn stop(&self) -> AudioResult<()>;
}

struct QueueState {
    pending: Vec<Bytes>,
    /// Bumped on every interruption; chunks queued before the bump are stale
    generation: u64,
    deadline: Option<Instant>,
    playing: bool,
}

struct Shared {
    output: Arc<dyn AudioOutput>,
    debounce: Duration,
    state: Mutex<QueueState>,
    notify: Notify,
}

/// Debounce queue in front of an [`AudioOutput`].
pub struct PlaybackBuffer {
    shared: Arc<Shared>,
    flusher: tokio::task::JoinHandle<()>,
}

impl PlaybackBuffer {
    /// Spawn the flush task. `debounce` is how long the queue must be quiet
    /// before pending chunks are concatenated and played.
    pub fn new(output: Arc<dyn AudioOutput>, debounce: Duration) -> Self {
        let shared = Arc::new(Shared {
            output,
            debounce,
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                generation: 0,
                deadline: None,
                playing: false,
            }),
            notify: Notify::new(),
        });

        let flusher = tokio::spawn(flush_loop(Arc::clone(&shared)));
        Self { shared, flusher }
    }

    /// Spawn the flush task with the debounce window from server
    /// configuration (`debounce_ms`).
    pub fn from_config(output: Arc<dyn AudioOutput>, config: &ServerConfig) -> Self {
        Self::new(output, Duration::from_millis(config.debounce_ms))
    }

    /// Queue a raw model PCM chunk and restart the debounce window.
    pub fn push(&self, chunk: Bytes) {
        {
            let mut state = self.shared.state.lock();
            state.pending.push(chunk);
            state.deadline = Some(Instant::now() + self.shared.debounce);
        }
        self.shared.notify.notify_one();
    }

    /// Drop everything queued and stop the device.
    ///
    /// The queue clear and generation bump happen under one lock, so a chunk
    /// arriving concurrently lands either wholly before the interruption
    /// (cleared) or wholly after (kept for the next response).
    pub async fn interrupt(&self) -> AudioResult<()> {
        {
            let mut state = self.shared.state.lock();
            let dropped = state.pending.len();
            state.pending.clear();
            state.generation += 1;
            state.deadline = None;
            state.playing = false;
            if dropped > 0 {
                debug!("Interrupted playback, dropped {dropped} pending chunks");
            }
        }
        self.shared.output.stop().await
    }

    /// Number of chunks waiting to be flushed.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }
}

impl Drop for PlaybackBuffer {
    fn drop(&mut self) {
        self.flusher.abort();
    }
}

async fn flush_loop(shared: Arc<Shared>) {
    loop {
        let deadline = shared.state.lock().deadline;
        match deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = shared.notify.notified() => continue,
                }
            }
            None => {
                shared.notify.notified().await;
                continue;
            }
        }

        // Debounce expired; take the queue if nothing is already playing.
        let (chunks, generation) = {
            let mut state = shared.state.lock();
            if state.playing || state.pending.is_empty() {
                state.deadline = None;
                continue;
            }
            if state.deadline.is_some_and(|d| d > Instant::now()) {
                continue;
            }
            state.deadline = None;
            state.playing = true;
            (std::mem::take(&mut state.pending), state.generation)
        };

        let buffer = concat_chunks(&chunks);
        if !buffer.samples.is_empty() {
            if let Err(e) = shared.output.play(buffer).await {
                warn!("Playback failed: {e}");
            }
        }

        let mut state = shared.state.lock();
        if state.generation == generation {
            state.playing = false;
            // Chunks that arrived while we were playing flush immediately
            if !state.pending.is_empty() {
                state.deadline = Some(Instant::now());
                shared.notify.notify_one();
            }
        }
    }
}

/// Decode and concatenate queued chunks. Malformed chunks are skipped so one
/// bad frame cannot silence the rest of the response.
fn concat_chunks(chunks: &[Bytes]) -> PlayableBuffer {
    let mut samples = Vec::new();
    for chunk in chunks {
        match convert::decode_model_chunk(chunk) {
            Ok(mut decoded) => samples.append(&mut decoded),
            Err(e) => warn!("Skipping undecodable audio chunk: {e}"),
        }
    }
    PlayableBuffer {
        samples,
        sample_rate: MODEL_OUTPUT_RATE,
    }
}
