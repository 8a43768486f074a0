pub mod schema;

use std::time::Duration;

use anyhow::Context;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tracing::info;

/// Handle to the shared state database. Every dashboard instance pointing
/// at the same URL coordinates WSPS state and cooldowns through it.
#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
}

impl Db {
    /// Only SQLite URLs are accepted: it is the one driver compiled in and the
    /// state queries use its upsert syntax.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(
            is_sqlite_url(database_url),
            "unsupported DATABASE_URL {database_url:?}: expected a sqlite: URL"
        );
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .with_context(|| format!("connect state database {database_url}"))?;

        info!(url = %database_url, "state database connected");
        Ok(Self { pool })
    }

    /// Private throwaway database; used by tests and local runs.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let name = uuid::Uuid::new_v4();
        let db = Self::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared")).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        schema::migrate(&self.pool).await.context("migrate state schema")
    }
}

fn is_sqlite_url(url: &str) -> bool {
    url.starts_with("sqlite:")
}
