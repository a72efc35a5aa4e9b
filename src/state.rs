//! Shared application state and the live-session registry.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::ServerConfig;

/// Snapshot of one live voice session, kept for observability and shutdown.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Model identifier the session was opened with
    pub model: String,
    /// When the client connected
    pub connected_at: std::time::Instant,
}

/// Registry of live voice sessions keyed by generated session id.
///
/// The registry never hands out the underlying model connection; the
/// connection is owned exclusively by the per-session task. Entries exist
/// so the rest of the server can count and enumerate sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened session and return its generated id.
    pub fn insert(&self, model: String) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionEntry {
                model,
                connected_at: std::time::Instant::now(),
            },
        );
        id
    }

    /// Remove a session at teardown. Returns the entry if it was present.
    pub fn remove(&self, id: &Uuid) -> Option<SessionEntry> {
        self.sessions.remove(id).map(|(_, entry)| entry)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}
