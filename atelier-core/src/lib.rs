//! # atelier-core — shared data model for the Atelier canvas platform
//!
//! Pure data types with no I/O: the infrastructure canvas graph, chat
//! messages, and the request/response types exchanged with the
//! code-generation and deployment collaborators.
//!
//! The synchronization core lives in `atelier-collab`; this crate is the
//! vocabulary both sides of the wire agree on.

pub mod canvas;
pub mod chat;
pub mod codegen;

pub use canvas::{CanvasState, Resource, ResourceKind, ResourceLink};
pub use chat::ChatMessage;
pub use codegen::{
    CodeGenRequest, CodeGenResponse, DeployOutcome, DeployRequest, DeployResponse, TargetFormat,
};

use std::time::SystemTime;

/// Milliseconds since the Unix epoch.
///
/// All timestamps in the model (canvas `last_updated`, chat `timestamp`)
/// use this representation.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
