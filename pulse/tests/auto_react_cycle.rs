mod support;

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use pulse::adapter::BreakerState;
use pulse::feeds::AdapterId;
use pulse::pulse_view::CycleOutcome;
use pulse::rules::{EventKind, GUARDRAILS};
use pulse::state::StateStore;
use pulse::wsps::Band;
use support::{engine_with, flush_rebound_feeds, memory_store, seed_wsps};

const T0: u64 = 1_767_225_600_000;
const MIN: u64 = 60_000;

#[tokio::test]
async fn flush_rebound_fires_once_per_cooldown_window() {
    let store = memory_store();
    seed_wsps(&store, 62, "yellow", T0 - MIN).await;
    let engine = engine_with(flush_rebound_feeds(), store);

    let first = engine.run_cycle(T0).await.unwrap();
    let ev = first.event.expect("FLUSH_REBOUND on the first cycle");
    assert_eq!(ev.event.kind, EventKind::FlushRebound);
    assert!(!ev.event.rationale.is_empty());
    assert_eq!(ev.event.guardrails, GUARDRAILS.map(String::from).to_vec());
    assert_eq!(ev.cooldown_expires_at_ms, T0 + 30 * MIN);

    let reading = first.reading.unwrap();
    assert!(!reading.degraded);
    assert!(!reading.reseeded);
    assert!(reading.ema_score >= 50);
    assert_eq!(reading.band, Band::Yellow);

    let second = engine.run_cycle(T0 + MIN).await.unwrap();
    assert!(second.event.is_none());
    assert_eq!(
        second.status.outcome,
        CycleOutcome::NoSignal {
            cooldown_blocked: vec![EventKind::FlushRebound]
        }
    );

    let later = engine.run_cycle(T0 + 30 * MIN).await.unwrap();
    assert_eq!(later.event.map(|e| e.event.kind), Some(EventKind::FlushRebound));

    let view_event = engine.view().last_event().await.unwrap();
    assert_eq!(view_event.event.ts_ms, T0 + 30 * MIN);
}

#[tokio::test]
async fn stale_indices_feed_suppresses_the_cycle() {
    let store = memory_store();
    seed_wsps(&store, 62, "yellow", T0 - MIN).await;
    let feeds = flush_rebound_feeds();
    feeds.fail(AdapterId::Indices, 503);
    let engine = engine_with(feeds, store);

    let report = engine.run_cycle(T0).await.unwrap();

    assert!(report.event.is_none());
    assert_eq!(
        report.status.outcome,
        CycleOutcome::SkippedStale {
            feeds: vec![AdapterId::Indices]
        }
    );
    assert!(report.status.degraded);

    // the reading is still published, flagged as degraded
    let published = engine.view().reading().await.unwrap();
    assert!(published.degraded);
    assert!(engine.view().last_event().await.is_none());
}

#[tokio::test]
async fn feed_recovering_after_stale_cycle_allows_emission() {
    let store = memory_store();
    seed_wsps(&store, 62, "yellow", T0 - MIN).await;
    let feeds = flush_rebound_feeds();
    feeds.fail(AdapterId::Indices, 500);
    let engine = engine_with(feeds.clone(), store);

    assert!(engine.run_cycle(T0).await.unwrap().event.is_none());

    feeds.set(AdapterId::Indices, r#"{"vix": 24.0}"#);
    let report = engine.run_cycle(T0 + MIN).await.unwrap();
    assert_eq!(report.event.map(|e| e.event.kind), Some(EventKind::FlushRebound));
    assert!(!report.status.degraded);
}

#[tokio::test]
async fn repeated_failures_open_the_circuit() {
    let feeds = flush_rebound_feeds();
    feeds.fail(AdapterId::RatesFx, 502);
    let engine = engine_with(feeds, memory_store());

    for i in 0..3 {
        engine.run_cycle(T0 + i * MIN).await.unwrap();
    }

    let breakers = engine.fetcher().breakers();
    let circuit = breakers.snapshot(AdapterId::RatesFx, T0 + 2 * MIN + 1);
    assert_eq!(circuit.state, BreakerState::Open);
    assert_eq!(circuit.consecutive_failures, 3);
    assert_eq!(circuit.next_retry_at_ms, Some(T0 + 2 * MIN + 30_000));

    // after the backoff the next cycle is the single trial
    assert_eq!(
        breakers.snapshot(AdapterId::RatesFx, T0 + 3 * MIN).state,
        BreakerState::HalfOpen
    );
    assert_eq!(
        breakers.snapshot(AdapterId::Indices, T0).state,
        BreakerState::Closed
    );
}

#[tokio::test]
async fn cold_start_reseeds_wsps_from_raw_score() {
    let engine = engine_with(flush_rebound_feeds(), memory_store());

    let report = engine.run_cycle(T0).await.unwrap();
    let reading = report.reading.unwrap();

    // one sample per factor: every normalized value is the neutral fallback
    assert!(reading.reseeded);
    assert_eq!(reading.raw_score, 50);
    assert_eq!(reading.ema_score, 50);
    assert_eq!(report.event.map(|e| e.event.kind), Some(EventKind::FlushRebound));
}

struct BrokenStore;

#[async_trait]
impl StateStore for BrokenStore {
    async fn get(&self, _key: &str, _now_ms: u64) -> anyhow::Result<Option<String>> {
        Err(anyhow!("database is locked"))
    }

    async fn put(&self, _key: &str, _value: &str, _ttl_ms: u64, _now_ms: u64) -> anyhow::Result<()> {
        Err(anyhow!("database is locked"))
    }

    async fn put_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl_ms: u64,
        _now_ms: u64,
    ) -> anyhow::Result<bool> {
        Err(anyhow!("database is locked"))
    }

    async fn purge_expired(&self, _now_ms: u64) -> anyhow::Result<u64> {
        Err(anyhow!("database is locked"))
    }
}

#[tokio::test]
async fn unavailable_state_store_skips_rules() {
    let engine = engine_with(flush_rebound_feeds(), Arc::new(BrokenStore));

    let report = engine.run_cycle(T0).await.unwrap();

    assert_eq!(report.status.outcome, CycleOutcome::ScoringUnavailable);
    assert!(report.reading.is_none());
    assert!(report.event.is_none());
    assert_eq!(
        engine.view().last_status().await.unwrap().outcome,
        CycleOutcome::ScoringUnavailable
    );
}
