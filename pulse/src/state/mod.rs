//! Durable, TTL-bounded key/value state shared by dashboard instances.
//!
//! Holds the smoothed WSPS state and the cooldown records. Expired entries
//! read as absent; they are never repaired.

pub mod fallback;
pub mod memory;
pub mod repository_sqlx;

use anyhow::Result;
use async_trait::async_trait;

pub use fallback::FallbackStateStore;
pub use memory::MemoryStateStore;
pub use repository_sqlx::SqlxStateStore;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Value for `key` unless absent or expired at `now_ms`.
    async fn get(&self, key: &str, now_ms: u64) -> Result<Option<String>>;

    /// Unconditional write, expiring at `now_ms + ttl_ms`.
    async fn put(&self, key: &str, value: &str, ttl_ms: u64, now_ms: u64) -> Result<()>;

    /// Writes only when `key` is absent or expired. Returns whether this
    /// caller won the write.
    async fn put_if_absent(&self, key: &str, value: &str, ttl_ms: u64, now_ms: u64)
    -> Result<bool>;

    /// Drops expired entries; returns how many were removed.
    async fn purge_expired(&self, now_ms: u64) -> Result<u64>;
}
