//! Durable, TTL-bounded session state.
//!
//! One RocksDB instance holds every session's canvas snapshot and chat
//! log. The store outlives gateway, registry, and broadcaster restarts:
//! those components are rebuilt from new connections, the store is not.
//!
//! Column families:
//! - `canvas`    — one snapshot per session, expiry-prefixed, LZ4 compressed
//! - `chat`      — append-only message log, keyed `session ++ 0x00 ++ seq`
//! - `chat_meta` — per-session log bookkeeping (next/oldest sequence, length)
//!
//! Consistency: all access goes through the one instance, so a canvas
//! read issued after a completed write for the same session observes that
//! write or a later one. Writes are last-write-wins, wholesale.

pub mod rocks;

pub use rocks::{SessionStore, StoreConfig, StoreError};
