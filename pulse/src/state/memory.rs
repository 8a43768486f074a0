use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::StateStore;

/// Process-local store. Used as the fallback tier and in tests.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, (String, u64)>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str, now_ms: u64) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .get(key)
            .filter(|(_, expires_at_ms)| now_ms < *expires_at_ms)
            .map(|(value, _)| value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl_ms: u64, now_ms: u64) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            (value.to_string(), now_ms.saturating_add(ttl_ms)),
        );
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
        now_ms: u64,
    ) -> Result<bool> {
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|(_, exp)| now_ms < *exp) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            (value.to_string(), now_ms.saturating_add(ttl_ms)),
        );
        Ok(true)
    }

    async fn purge_expired(&self, now_ms: u64) -> Result<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (_, exp)| now_ms < *exp);
        Ok((before - entries.len()) as u64)
    }
}
