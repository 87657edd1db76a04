//! # atelier-collab — real-time session synchronization for Atelier
//!
//! Several participants edit one shared infrastructure canvas and chat
//! in real time; the current state is held durably so late joiners can
//! resynchronize.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    WebSocket     ┌──────────────┐
//! │ Participant  │ ◄──────────────► │   Gateway    │ (one per connection)
//! │  (browser)   │   JSON frames    └──────┬───────┘
//! └──────────────┘                         │
//!                                          ▼
//!                                  ┌──────────────┐
//!                                  │SessionService│
//!                                  └──────┬───────┘
//!                          ┌──────────────┼───────────────┐
//!                          ▼              ▼               ▼
//!                  ┌──────────────┐ ┌────────────┐ ┌──────────────┐
//!                  │SessionRegistry│ │Broadcaster │ │ SessionStore │
//!                  │ (live handles)│ │ (fan-out)  │ │  (RocksDB)   │
//!                  └──────────────┘ └────────────┘ └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON `{type, data}` envelopes and outbound events
//! - [`registry`] — live connections per session
//! - [`broadcast`] — best-effort fan-out with dead-handle pruning
//! - [`storage`] — durable canvas snapshots and bounded chat logs
//! - [`gateway`] — per-connection state machine
//! - [`server`] — accept loop and shared state assembly
//! - [`service`] — accessors shared by sockets and request/response fronts
//!
//! Updates are last-write-wins and wholesale: there is no merge of
//! concurrent edits and no version clock. Delivery is at-most-once.

pub mod broadcast;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod service;
pub mod storage;

pub use broadcast::{BroadcastStats, Broadcaster};
pub use error::SyncError;
pub use gateway::Gateway;
pub use protocol::{ClientEnvelope, ProtocolError, ServerEvent};
pub use registry::{ParticipantHandle, SessionRegistry};
pub use server::{CollabServer, ServerConfig, ServerStats};
pub use service::{CodeGenerator, CollaboratorFault, DeployExecutor, SessionService};
pub use storage::{SessionStore, StoreConfig, StoreError};
