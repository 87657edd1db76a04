//! Best-effort fan-out of one event to every live handle of a session.
//!
//! Delivery is at-most-once and fire-and-forget: the event is encoded
//! once, then offered to each handle's bounded outbound queue. A handle
//! that cannot take the frame — its connection task is gone, or its
//! queue is full because the consumer stopped draining — counts as a
//! failed delivery and is unregistered before the call returns, so a
//! later broadcast never retries a dead handle. A failure for one handle
//! never aborts delivery to the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{ProtocolError, ServerEvent};
use crate::registry::SessionRegistry;

/// Snapshot of broadcast counters.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub events_broadcast: u64,
    pub frames_delivered: u64,
    pub frames_failed: u64,
    pub handles_pruned: u64,
}

/// Counters kept as atomics so the fan-out hot path never takes a lock.
#[derive(Default)]
struct AtomicBroadcastStats {
    events_broadcast: AtomicU64,
    frames_delivered: AtomicU64,
    frames_failed: AtomicU64,
    handles_pruned: AtomicU64,
}

/// The broadcast engine, shared by gateways and the service façade.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    stats: Arc<AtomicBroadcastStats>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            stats: Arc::new(AtomicBroadcastStats::default()),
        }
    }

    /// Deliver `event` to every handle currently listed for `session`,
    /// except `exclude` if given. Returns the number of handles that
    /// accepted the frame.
    pub async fn broadcast(
        &self,
        session: &str,
        event: &ServerEvent,
        exclude: Option<Uuid>,
    ) -> Result<usize, ProtocolError> {
        // Encode once; the text frame is refcounted so per-handle clones
        // share the same buffer.
        let frame = Message::text(event.encode()?);
        let handles = self.registry.handles(session).await;

        self.stats.events_broadcast.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0usize;
        let mut dead = Vec::new();
        for handle in handles {
            if Some(handle.id) == exclude {
                continue;
            }
            match handle.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    log::warn!(
                        "Dropping handle {} in session {session}: {e}",
                        handle.id
                    );
                    dead.push(handle.id);
                }
            }
        }

        self.stats
            .frames_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .frames_failed
            .fetch_add(dead.len() as u64, Ordering::Relaxed);

        // Prune failures as part of the same call: a subsequent broadcast
        // never sees a handle whose send already failed.
        for id in dead {
            self.registry.unregister(session, id).await;
            self.stats.handles_pruned.fetch_add(1, Ordering::Relaxed);
        }

        Ok(delivered)
    }

    /// Lock-free counter snapshot.
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            events_broadcast: self.stats.events_broadcast.load(Ordering::Relaxed),
            frames_delivered: self.stats.frames_delivered.load(Ordering::Relaxed),
            frames_failed: self.stats.frames_failed.load(Ordering::Relaxed),
            handles_pruned: self.stats.handles_pruned.load(Ordering::Relaxed),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
