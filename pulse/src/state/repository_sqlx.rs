use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sqlx::{AnyPool, Row};

use super::StateStore;

/// SQLx-backed implementation of StateStore.
/// Shared by every dashboard instance pointing at the same database.
pub struct SqlxStateStore {
    pool: AnyPool,
}

impl SqlxStateStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqlxStateStore {
    async fn get(&self, key: &str, now_ms: u64) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(
            r#"
SELECT value
FROM pulse_state
WHERE state_key = ? AND expires_at_ms > ?;
"#,
        )
        .bind(key.to_string())
        .bind(u64_to_i64(now_ms)?)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("read state key {key}"))?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn put(&self, key: &str, value: &str, ttl_ms: u64, now_ms: u64) -> anyhow::Result<()> {
        let expires_at = u64_to_i64(now_ms.saturating_add(ttl_ms))?;

        sqlx::query(
            r#"
INSERT INTO pulse_state (state_key, value, expires_at_ms)
VALUES (?, ?, ?)
ON CONFLICT (state_key) DO UPDATE
SET value = excluded.value, expires_at_ms = excluded.expires_at_ms;
"#,
        )
        .bind(key.to_string())
        .bind(value.to_string())
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("write state key {key}"))?;

        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
        now_ms: u64,
    ) -> anyhow::Result<bool> {
        let expires_at = u64_to_i64(now_ms.saturating_add(ttl_ms))?;

        // Single statement: the row is written only if missing or expired,
        // so two instances racing for the same key cannot both win.
        let result = sqlx::query(
            r#"
INSERT INTO pulse_state (state_key, value, expires_at_ms)
VALUES (?, ?, ?)
ON CONFLICT (state_key) DO UPDATE
SET value = excluded.value, expires_at_ms = excluded.expires_at_ms
WHERE pulse_state.expires_at_ms <= ?;
"#,
        )
        .bind(key.to_string())
        .bind(value.to_string())
        .bind(expires_at)
        .bind(u64_to_i64(now_ms)?)
        .execute(&self.pool)
        .await
        .with_context(|| format!("claim state key {key}"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, now_ms: u64) -> anyhow::Result<u64> {
        let result = sqlx::query(r#"DELETE FROM pulse_state WHERE expires_at_ms <= ?;"#)
            .bind(u64_to_i64(now_ms)?)
            .execute(&self.pool)
            .await
            .context("purge expired state")?;

        Ok(result.rows_affected())
    }
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}
