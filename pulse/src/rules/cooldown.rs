//! Two-tier cooldown: a process-local map in front of the shared store.
//!
//! A kind is cooling if either tier says so. Emission claims the durable
//! record first; only the instance that wins the claim may emit.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::types::{CooldownRecord, EventKind};
use crate::state::StateStore;

pub const COOLDOWN_SECS: u64 = 30 * 60;

pub fn cooldown_key(kind: EventKind) -> String {
    format!("cooldown:{}", kind)
}

pub struct CooldownGate {
    local: Mutex<HashMap<EventKind, u64>>,
    store: Arc<dyn StateStore>,
    duration_ms: u64,
}

impl CooldownGate {
    pub fn new(store: Arc<dyn StateStore>, duration_secs: u64) -> Self {
        Self {
            local: Mutex::new(HashMap::new()),
            store,
            duration_ms: duration_secs.saturating_mul(1_000),
        }
    }

    /// Expiry of the active cooldown for `kind`, if any.
    pub async fn is_cooling(&self, kind: EventKind, now_ms: u64) -> anyhow::Result<Option<u64>> {
        if let Some(&expires) = self.local.lock().get(&kind) {
            if now_ms < expires {
                return Ok(Some(expires));
            }
        }

        let durable = self.read_durable(kind, now_ms).await?;
        if let Some(expires) = durable {
            self.local.lock().insert(kind, expires);
        }
        Ok(durable)
    }

    /// Claims the cooldown window starting at `now_ms`. Returns the expiry
    /// when this caller won, `None` when another instance holds it.
    pub async fn claim(&self, kind: EventKind, now_ms: u64) -> anyhow::Result<Option<u64>> {
        let expires_at_ms = now_ms.saturating_add(self.duration_ms);
        let record = serde_json::to_string(&CooldownRecord {
            event_kind: kind,
            expires_at_ms,
        })?;

        let won = self
            .store
            .put_if_absent(&cooldown_key(kind), &record, self.duration_ms, now_ms)
            .await
            .with_context(|| format!("claim cooldown for {kind}"))?;

        if won {
            self.local.lock().insert(kind, expires_at_ms);
            return Ok(Some(expires_at_ms));
        }

        debug!(%kind, "cooldown already claimed elsewhere");
        if let Some(expires) = self.read_durable(kind, now_ms).await? {
            self.local.lock().insert(kind, expires);
        }
        Ok(None)
    }

    async fn read_durable(&self, kind: EventKind, now_ms: u64) -> anyhow::Result<Option<u64>> {
        let raw = self
            .store
            .get(&cooldown_key(kind), now_ms)
            .await
            .with_context(|| format!("read cooldown for {kind}"))?;

        Ok(raw.and_then(|s| match serde_json::from_str::<CooldownRecord>(&s) {
            Ok(r) if now_ms < r.expires_at_ms => Some(r.expires_at_ms),
            Ok(_) => None,
            Err(e) => {
                warn!(%kind, error = %e, "unreadable cooldown record; ignoring");
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;

    const MIN: u64 = 60_000;

    #[tokio::test]
    async fn claim_then_cooling_until_expiry() {
        let gate = CooldownGate::new(Arc::new(MemoryStateStore::new()), COOLDOWN_SECS);
        let k = EventKind::FlushRebound;

        assert_eq!(gate.is_cooling(k, 0).await.unwrap(), None);
        assert_eq!(gate.claim(k, 0).await.unwrap(), Some(30 * MIN));

        assert_eq!(gate.is_cooling(k, 29 * MIN).await.unwrap(), Some(30 * MIN));
        assert_eq!(gate.is_cooling(k, 30 * MIN).await.unwrap(), None);
        assert_eq!(gate.is_cooling(EventKind::MomentumAdd, MIN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_instance_sees_durable_cooldown() {
        let store: Arc<MemoryStateStore> = Arc::new(MemoryStateStore::new());
        let a = CooldownGate::new(store.clone(), COOLDOWN_SECS);
        let b = CooldownGate::new(store, COOLDOWN_SECS);
        let k = EventKind::DollarSqueeze;

        assert!(a.claim(k, 0).await.unwrap().is_some());
        assert_eq!(b.is_cooling(k, MIN).await.unwrap(), Some(30 * MIN));
    }

    #[tokio::test]
    async fn only_one_concurrent_claim_wins() {
        let store: Arc<MemoryStateStore> = Arc::new(MemoryStateStore::new());
        let a = CooldownGate::new(store.clone(), COOLDOWN_SECS);
        let b = CooldownGate::new(store, COOLDOWN_SECS);
        let k = EventKind::MacroEventHold;

        let (ra, rb) = tokio::join!(a.claim(k, 0), b.claim(k, 0));
        let wins = [ra.unwrap(), rb.unwrap()].iter().filter(|r| r.is_some()).count();
        assert_eq!(wins, 1);

        // the loser learned the expiry locally
        assert_eq!(b.is_cooling(k, MIN).await.unwrap(), Some(30 * MIN));
        assert_eq!(a.is_cooling(k, MIN).await.unwrap(), Some(30 * MIN));
    }

    #[tokio::test]
    async fn local_tier_blocks_even_if_durable_record_is_gone() {
        let store: Arc<MemoryStateStore> = Arc::new(MemoryStateStore::new());
        let gate = CooldownGate::new(store.clone(), COOLDOWN_SECS);
        let k = EventKind::CapitulationDefense;

        gate.claim(k, 0).await.unwrap();
        store.purge_expired(u64::MAX).await.unwrap();

        assert_eq!(gate.is_cooling(k, MIN).await.unwrap(), Some(30 * MIN));
    }
}
