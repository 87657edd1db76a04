//! Error kinds surfaced by the synchronization core.

use crate::protocol::ProtocolError;
use crate::storage::StoreError;

/// What went wrong with one synchronization operation.
///
/// Each kind has a distinct blast radius:
/// - `Transport` — one connection failed; the handle is dropped, nobody
///   else is affected.
/// - `Persistence` — the store rejected or never saw the write; the
///   operation fails and no broadcast is issued for it.
/// - `Validation` — one inbound frame was malformed or of unknown type;
///   that single frame is rejected, the connection stays open.
#[derive(Debug)]
pub enum SyncError {
    Transport(String),
    Persistence(StoreError),
    Validation(ProtocolError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::Persistence(e) => write!(f, "Persistence error: {e}"),
            Self::Validation(e) => write!(f, "Validation error: {e}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(_) => None,
            Self::Persistence(e) => Some(e),
            Self::Validation(e) => Some(e),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e)
    }
}

impl From<ProtocolError> for SyncError {
    fn from(e: ProtocolError) -> Self {
        Self::Validation(e)
    }
}
