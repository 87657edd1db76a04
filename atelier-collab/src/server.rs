//! WebSocket synchronization server.
//!
//! Architecture:
//! ```text
//! Participant A ──┐
//!                 ├── Gateway (per connection)
//! Participant B ──┘        │
//!                          ├── SessionRegistry (live handles per session)
//!                          ├── Broadcaster     (fan-out with pruning)
//!                          └── SessionStore    (RocksDB: canvas + chat)
//! ```
//!
//! One process serves many sessions and many connections per session; a
//! single-process cooperative event loop (tokio) suspends at frame and
//! store boundaries. The registry and broadcaster are rebuilt from new
//! connections after a restart; the store is not — it is the durable
//! side of the system.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::gateway::Gateway;
use crate::registry::SessionRegistry;
use crate::service::SessionService;
use crate::storage::{SessionStore, StoreConfig, StoreError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Session store configuration (path, TTL, chat cap)
    pub store: StoreConfig,
    /// Outbound frames buffered per connection before a participant
    /// counts as a failed consumer
    pub send_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            store: StoreConfig::default(),
            send_buffer: 256,
        }
    }
}

/// Server-wide statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub frames_in: u64,
}

/// The synchronization server: accept loop plus shared session state.
pub struct CollabServer {
    config: ServerConfig,
    service: Arc<SessionService>,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    /// Open the session store and assemble the server.
    pub fn open(config: ServerConfig) -> Result<Self, StoreError> {
        let store = Arc::new(SessionStore::open(config.store.clone())?);
        let registry = Arc::new(SessionRegistry::new());
        let service = Arc::new(SessionService::new(store, registry));
        Ok(Self {
            config,
            service,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        })
    }

    /// Listen for connections and spawn one gateway per accepted socket.
    ///
    /// Runs until the listener fails. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Sync server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");
            self.spawn_gateway(stream, addr);
        }
    }

    fn spawn_gateway(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let service = self.service.clone();
        let stats = self.stats.clone();
        let send_buffer = self.config.send_buffer;

        tokio::spawn(async move {
            if let Err(e) = Gateway::run(stream, addr, service, stats, send_buffer).await {
                log::error!("Connection error from {addr}: {e}");
            }
        });
    }

    /// Shared session operations (store, registry, broadcaster).
    pub fn service(&self) -> Arc<SessionService> {
        self.service.clone()
    }

    /// Snapshot of server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}
