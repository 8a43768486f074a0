use std::sync::Arc;

use common::logger::init_tracing;
use pulse::{
    adapter::{CachedFetcher, CircuitBreakerRegistry, ReqwestTransport},
    api::{AppState, create_router},
    config::AppConfig,
    db::Db,
    engine::AutoReactEngine,
    feeds::feed_requests,
    metrics::{CycleCounters, FetchCounters},
    normalize::NormalizationStore,
    pulse_view::PulseView,
    rules::RuleEngine,
    state::{FallbackStateStore, SqlxStateStore, StateStore},
    wsps::WspsEngine,
};
use tokio::sync::watch;

/// Connects the shared database, runs migrations and wraps it with the
/// process-local fallback tier.
async fn init_state_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let durable: Arc<dyn StateStore> = Arc::new(SqlxStateStore::new(db.pool.clone()));
    Ok(Arc::new(FallbackStateStore::new(durable)))
}

fn build_engine(
    cfg: &AppConfig,
    store: Arc<dyn StateStore>,
    view: PulseView,
) -> anyhow::Result<AutoReactEngine> {
    let pulse = &cfg.pulse;

    let transport = Arc::new(ReqwestTransport::new(cfg.http_timeout)?);
    let breakers = Arc::new(CircuitBreakerRegistry::new(pulse.breaker.clone()));
    let fetcher = CachedFetcher::new(transport, breakers, FetchCounters::default());

    Ok(AutoReactEngine::new(
        fetcher,
        feed_requests(&pulse.feeds, cfg.feed_api_key.as_deref()),
        NormalizationStore::new(pulse.normalization.clone()),
        WspsEngine::new(pulse.wsps.clone(), store.clone()),
        RuleEngine::new(&pulse.rules, store.clone()),
        store,
        view,
        CycleCounters::default(),
    )
    .with_poll_interval(pulse.poll_interval()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config errors abort before anything starts.
    let cfg = AppConfig::from_env()?;
    init_tracing("pulse", cfg.json_logs);

    tracing::info!(bind = %cfg.bind_addr, "Starting market pulse pipeline...");

    let store = init_state_store(&cfg).await?;
    let view = PulseView::new();
    let engine = Arc::new(build_engine(&cfg, store, view.clone())?);

    let state = Arc::new(AppState {
        view,
        breakers: engine.fetcher().breakers().clone(),
        fetch_counters: engine.fetcher().counters().clone(),
        cycle_counters: engine.counters().clone(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(Arc::clone(&engine).run(shutdown_rx));

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    let mut api_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, create_router(state))
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.changed().await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    shutdown_tx.send_replace(true);
    poller.await?;
    server.await??;

    Ok(())
}
