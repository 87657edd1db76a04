//! In-memory registry of live connections per session.
//!
//! The registry is the only shared, frequently-mutated in-process
//! structure. All mutations go through one async `RwLock`, so connects
//! and disconnects racing on the same session are serialized and no
//! registration is lost. It holds no persistent state — it is rebuilt
//! from scratch by new connections after a restart.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// One live connection endpoint, registered under exactly one session.
///
/// The sender feeds the connection's writer task; it is bounded, so a
/// consumer that stops draining its socket fails fast on `try_send`
/// instead of stalling fan-out to the rest of the session.
#[derive(Debug, Clone)]
pub struct ParticipantHandle {
    pub id: Uuid,
    pub tx: mpsc::Sender<Message>,
}

impl ParticipantHandle {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }
}

/// Session id → set of live participant handles.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, HashMap<Uuid, ParticipantHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to the session's live set.
    ///
    /// Idempotent: re-registering a handle with the same id is a no-op.
    pub async fn register(&self, session: &str, handle: ParticipantHandle) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session.to_string())
            .or_default()
            .entry(handle.id)
            .or_insert(handle);
    }

    /// Remove a handle from the session's live set.
    ///
    /// When the set becomes empty the session entry itself is pruned, so
    /// registry memory is bounded by the number of active sessions.
    pub async fn unregister(&self, session: &str, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if let Some(handles) = sessions.get_mut(session) {
            handles.remove(&id);
            if handles.is_empty() {
                sessions.remove(session);
            }
        }
    }

    /// Number of live handles for a session; 0 when the session has no entry.
    pub async fn count(&self, session: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session)
            .map_or(0, HashMap::len)
    }

    /// Snapshot of the session's live set for fan-out.
    ///
    /// Reflects every registration completed before the call; no ordering
    /// among handles is guaranteed.
    pub async fn handles(&self, session: &str) -> Vec<ParticipantHandle> {
        self.sessions
            .read()
            .await
            .get(session)
            .map(|handles| handles.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of sessions with at least one live handle.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the session has an entry at all.
    pub async fn contains(&self, session: &str) -> bool {
        self.sessions.read().await.contains_key(session)
    }
}
