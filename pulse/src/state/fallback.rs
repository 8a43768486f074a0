use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use super::{MemoryStateStore, StateStore};

/// Durable store first, process-local store when the durable one errors.
///
/// Writes always land in the local tier too, so a durable outage mid-run
/// still sees the values this instance wrote last.
pub struct FallbackStateStore {
    primary: Arc<dyn StateStore>,
    local: MemoryStateStore,
}

impl FallbackStateStore {
    pub fn new(primary: Arc<dyn StateStore>) -> Self {
        Self {
            primary,
            local: MemoryStateStore::new(),
        }
    }
}

#[async_trait]
impl StateStore for FallbackStateStore {
    async fn get(&self, key: &str, now_ms: u64) -> Result<Option<String>> {
        match self.primary.get(key, now_ms).await {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(error = ?e, key, "durable state read failed; using local state");
                self.local.get(key, now_ms).await
            }
        }
    }

    async fn put(&self, key: &str, value: &str, ttl_ms: u64, now_ms: u64) -> Result<()> {
        self.local.put(key, value, ttl_ms, now_ms).await?;

        if let Err(e) = self.primary.put(key, value, ttl_ms, now_ms).await {
            warn!(error = ?e, key, "durable state write failed; kept local copy");
        }
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
        now_ms: u64,
    ) -> Result<bool> {
        match self.primary.put_if_absent(key, value, ttl_ms, now_ms).await {
            Ok(won) => {
                if won {
                    self.local.put(key, value, ttl_ms, now_ms).await?;
                }
                Ok(won)
            }
            Err(e) => {
                warn!(error = ?e, key, "durable claim failed; claiming locally");
                self.local.put_if_absent(key, value, ttl_ms, now_ms).await
            }
        }
    }

    async fn purge_expired(&self, now_ms: u64) -> Result<u64> {
        let local = self.local.purge_expired(now_ms).await?;
        match self.primary.purge_expired(now_ms).await {
            Ok(n) => Ok(n),
            Err(e) => {
                warn!(error = ?e, "durable purge failed");
                Ok(local)
            }
        }
    }
}
