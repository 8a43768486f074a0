use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // WSPS state + cooldown records, one row per key
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS pulse_state (
  state_key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  expires_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_pulse_state_expiry ON pulse_state(expires_at_ms);"#)
        .execute(pool)
        .await?;

    Ok(())
}
