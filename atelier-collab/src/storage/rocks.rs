//! RocksDB-backed session store.
//!
//! Value layouts:
//! - canvas: `<expires_at_millis: 8 bytes BE><lz4(json CanvasState)>`
//! - chat:   JSON-encoded [`ChatMessage`], one entry per key
//! - chat_meta: bincode-encoded [`ChatLogMeta`]
//!
//! Canvas expiry is lazy: an entry past its expiry reads as absent and is
//! deleted on that read. Every write refreshes the expiry window.
//!
//! Chat keys embed a NUL separator between session id and sequence
//! number; session ids must not contain NUL bytes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};

use atelier_core::{now_millis, CanvasState, ChatMessage};

const CF_CANVAS: &str = "canvas";
const CF_CHAT: &str = "chat";
const CF_CHAT_META: &str = "chat_meta";

const COLUMN_FAMILIES: &[&str] = &[CF_CANVAS, CF_CHAT, CF_CHAT_META];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Canvas snapshot expiry window, refreshed on every write (default: 24h)
    pub canvas_ttl: Duration,
    /// Maximum chat entries retained per session (default: 1000)
    pub chat_capacity: u64,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("atelier_data"),
            canvas_ttl: Duration::from_secs(60 * 60 * 24),
            chat_capacity: 1000,
            block_cache_size: 64 * 1024 * 1024,
            sync_writes: false,
            max_open_files: 256,
        }
    }
}

impl StoreConfig {
    /// Config for testing: small caches, caller-provided temp directory.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            max_open_files: 64,
            ..Self::default()
        }
    }
}

/// Per-session chat log bookkeeping.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct ChatLogMeta {
    /// Sequence number the next append receives
    next_seq: u64,
    /// Sequence number of the oldest retained entry
    oldest_seq: u64,
    /// Retained entry count, <= chat_capacity
    len: u64,
}

impl ChatLogMeta {
    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(meta)
    }
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    Database(String),
    /// Serialization failed
    Serialization(String),
    /// Deserialization failed
    Deserialization(String),
    /// Compression error
    Compression(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {e}"),
            StoreError::Serialization(e) => write!(f, "Serialization error: {e}"),
            StoreError::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            StoreError::Compression(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// The durable session state store.
pub struct SessionStore {
    /// RocksDB instance (single-threaded mode — concurrency via tokio)
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl SessionStore {
    /// Open the store at the configured path, creating the database and
    /// column families if they don't exist.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);

        match name {
            CF_CANVAS => {
                // Values are LZ4-compressed already; point lookups only
                opts.set_compression_type(DBCompressionType::None);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_CHAT => {
                // Many small writes, prefix-scanned per session
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.set_max_write_buffer_number(4);
            }
            CF_CHAT_META => {
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    // ─── Canvas ───────────────────────────────────────────────────────

    /// Overwrite the session's canvas snapshot wholesale and refresh its
    /// expiry window. No field-level merge: last writer wins.
    pub fn put_canvas(&self, session: &str, canvas: &CanvasState) -> Result<(), StoreError> {
        let cf = self.cf(CF_CANVAS)?;

        let json = serde_json::to_vec(canvas)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&json);

        let expires_at = now_millis() + self.config.canvas_ttl.as_millis() as u64;
        let mut value = Vec::with_capacity(8 + compressed.len());
        value.extend_from_slice(&expires_at.to_be_bytes());
        value.extend_from_slice(&compressed);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .put_cf_opt(&cf, session.as_bytes(), &value, &write_opts)?;
        Ok(())
    }

    /// The stored snapshot, or the default empty canvas when no entry
    /// exists or the entry expired. Expired entries are deleted on read.
    pub fn canvas(&self, session: &str) -> Result<CanvasState, StoreError> {
        let cf = self.cf(CF_CANVAS)?;

        let value = match self.db.get_cf(&cf, session.as_bytes())? {
            Some(v) => v,
            None => return Ok(CanvasState::default()),
        };
        if value.len() < 8 {
            return Err(StoreError::Deserialization(
                "canvas entry shorter than expiry prefix".into(),
            ));
        }

        let mut expiry = [0u8; 8];
        expiry.copy_from_slice(&value[..8]);
        if now_millis() >= u64::from_be_bytes(expiry) {
            self.db.delete_cf(&cf, session.as_bytes())?;
            return Ok(CanvasState::default());
        }

        let json = lz4_flex::decompress_size_prepended(&value[8..])
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    // ─── Chat ─────────────────────────────────────────────────────────

    /// Append one message to the session's bounded log. When the log
    /// would exceed its capacity the oldest entries are dropped in the
    /// same atomic batch until exactly `chat_capacity` remain.
    pub fn append_chat(&self, session: &str, message: &ChatMessage) -> Result<(), StoreError> {
        let cf_chat = self.cf(CF_CHAT)?;
        let cf_meta = self.cf(CF_CHAT_META)?;

        let mut meta = match self.db.get_cf(&cf_meta, session.as_bytes())? {
            Some(bytes) => ChatLogMeta::decode(&bytes)?,
            None => ChatLogMeta::default(),
        };

        let encoded = serde_json::to_vec(message)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_chat, chat_key(session, meta.next_seq), &encoded);
        meta.next_seq += 1;
        meta.len += 1;

        while meta.len > self.config.chat_capacity {
            batch.delete_cf(&cf_chat, chat_key(session, meta.oldest_seq));
            meta.oldest_seq += 1;
            meta.len -= 1;
        }

        batch.put_cf(&cf_meta, session.as_bytes(), meta.encode()?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    /// Up to `count` most recent messages, oldest-first.
    pub fn chat_history(&self, session: &str, count: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let cf = self.cf(CF_CHAT)?;
        let prefix = chat_prefix(session);
        let upper = chat_key(session, u64::MAX);

        // Scan newest-to-oldest, stop at `count`, then flip.
        let mut messages = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&upper, Direction::Reverse));
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if messages.len() >= count {
                break;
            }
            let message: ChatMessage = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            messages.push(message);
        }

        messages.reverse();
        Ok(messages)
    }

    /// Number of retained chat entries for a session.
    pub fn chat_len(&self, session: &str) -> Result<u64, StoreError> {
        let cf = self.cf(CF_CHAT_META)?;
        match self.db.get_cf(&cf, session.as_bytes())? {
            Some(bytes) => Ok(ChatLogMeta::decode(&bytes)?.len),
            None => Ok(0),
        }
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }
}

/// Chat entry key: `session ++ 0x00 ++ seq (8 bytes big-endian)`.
fn chat_key(session: &str, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(session.len() + 9);
    key.extend_from_slice(session.as_bytes());
    key.push(0);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Prefix shared by all chat keys of one session.
fn chat_prefix(session: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(session.len() + 1);
    prefix.extend_from_slice(session.as_bytes());
    prefix.push(0);
    prefix
}
