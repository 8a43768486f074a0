//! Auto-react polling loop.
//!
//! Data flow per tick:
//! feeds (fan-out) -> snapshot -> normalization -> WSPS -> stale gate ->
//! rules + cooldown -> PulseView

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{Instrument, debug, info, warn};

use crate::adapter::{CachedFetcher, FeedRequest, FetchError, FetchOutcome, FetchStatus};
use crate::feeds::{AdapterId, FeedSnapshot, parse_payload};
use crate::metrics::CycleCounters;
use crate::normalize::{Factor, FactorSample, NormalizationStore, NormalizedValue};
use crate::pulse_view::{CycleOutcome, CycleStatus, PulseView};
use crate::rules::{EmittedEvent, RuleDecision, RuleEngine, RuleInputs};
use crate::state::StateStore;
use crate::wsps::{FactorInput, WspsEngine, WspsReading};
use common::logger::{TraceId, annotate_adapter, child_span, cycle_span, warn_if_slow};

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Cycle timestamps anchored to the scheduled tick rather than the wake-up
/// time, so consecutive cycles are exactly one period apart and cache TTLs
/// expire on the same cycle every time.
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    wall_base_ms: u64,
    instant_base: Instant,
}

impl TickClock {
    pub fn new(wall_base_ms: u64, instant_base: Instant) -> Self {
        Self {
            wall_base_ms,
            instant_base,
        }
    }

    pub fn at(&self, tick: Instant) -> u64 {
        let elapsed = tick.saturating_duration_since(self.instant_base);
        self.wall_base_ms.saturating_add(elapsed.as_millis() as u64)
    }
}

/// Everything one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub reading: Option<WspsReading>,
    pub event: Option<EmittedEvent>,
}

pub struct AutoReactEngine {
    fetcher: CachedFetcher,
    requests: Vec<FeedRequest>,
    normalization: Mutex<NormalizationStore>,
    wsps: WspsEngine,
    rules: RuleEngine,
    store: Arc<dyn StateStore>,
    view: PulseView,
    counters: CycleCounters,
    poll_every: Duration,
}

impl AutoReactEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: CachedFetcher,
        requests: Vec<FeedRequest>,
        normalization: NormalizationStore,
        wsps: WspsEngine,
        rules: RuleEngine,
        store: Arc<dyn StateStore>,
        view: PulseView,
        counters: CycleCounters,
    ) -> Self {
        Self {
            fetcher,
            requests,
            normalization: Mutex::new(normalization),
            wsps,
            rules,
            store,
            view,
            counters,
            poll_every: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, every: Duration) -> Self {
        self.poll_every = every;
        self
    }

    pub fn fetcher(&self) -> &CachedFetcher {
        &self.fetcher
    }

    pub fn view(&self) -> &PulseView {
        &self.view
    }

    pub fn counters(&self) -> &CycleCounters {
        &self.counters
    }

    /// Runs until `shutdown` flips to true. An in-flight cycle always
    /// completes; only further ticks are cancelled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(every_ms = self.poll_every.as_millis() as u64, "auto-react poller started");

        let clock = TickClock::new(common::time::now_ms(), Instant::now());

        loop {
            let tick = tokio::select! {
                tick = ticker.tick() => tick,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("shutdown sender dropped; auto-react poller stopping");
                        break;
                    }
                    continue;
                }
            };
            if *shutdown.borrow() {
                info!("auto-react poller stopping");
                break;
            }

            let now_ms = clock.at(tick);
            if let Err(e) = self.run_cycle(now_ms).await {
                warn!(error = ?e, "auto-react cycle failed");
            }
        }
    }

    pub async fn run_cycle(&self, now_ms: u64) -> anyhow::Result<CycleReport> {
        let trace_id = TraceId::default();
        let span = cycle_span(&trace_id, now_ms);
        self.cycle(trace_id, now_ms).instrument(span).await
    }

    async fn cycle(&self, trace_id: TraceId, now_ms: u64) -> anyhow::Result<CycleReport> {
        CycleCounters::bump(&self.counters.cycles);

        let snapshot = self.collect(now_ms).await;
        let degraded = snapshot.is_degraded();
        let stale_feeds: Vec<AdapterId> = snapshot.stale.iter().copied().collect();

        let inputs = self.factor_inputs(&snapshot);
        let reading = match self.wsps.evaluate(&inputs, degraded, now_ms).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = ?e, "wsps unavailable; skipping rules this cycle");
                CycleCounters::bump(&self.counters.store_errors);
                let status = self
                    .finish(trace_id, now_ms, CycleOutcome::ScoringUnavailable, degraded, stale_feeds)
                    .await;
                return Ok(CycleReport {
                    status,
                    reading: None,
                    event: None,
                });
            }
        };
        self.view.publish_reading(reading.clone()).await;

        let rule_inputs = RuleInputs::from_cycle(&snapshot, &reading, now_ms);
        let (outcome, event) = match self.rules.decide(&snapshot, &rule_inputs, now_ms).await {
            Ok(RuleDecision::Emitted(ev)) => {
                tracing::Span::current().record("event_kind", ev.event.kind.as_str());
                CycleCounters::bump(&self.counters.events_emitted);
                self.view.publish_event(ev.clone()).await;
                (CycleOutcome::Emitted { kind: ev.event.kind }, Some(ev))
            }
            Ok(RuleDecision::SkippedStale(feeds)) => {
                CycleCounters::bump(&self.counters.stale_skips);
                (CycleOutcome::SkippedStale { feeds }, None)
            }
            Ok(RuleDecision::NoSignal { cooldown_blocked }) => {
                if cooldown_blocked.is_empty() {
                    CycleCounters::bump(&self.counters.no_signal);
                } else {
                    CycleCounters::bump(&self.counters.cooldown_blocked);
                }
                (CycleOutcome::NoSignal { cooldown_blocked }, None)
            }
            Err(e) => {
                warn!(error = ?e, "cooldown state unavailable; no event this cycle");
                CycleCounters::bump(&self.counters.store_errors);
                (CycleOutcome::RulesUnavailable, None)
            }
        };

        match self.store.purge_expired(now_ms).await {
            Ok(0) => {}
            Ok(n) => debug!(purged = n, "expired state purged"),
            Err(e) => warn!(error = ?e, "state purge failed"),
        }

        let status = self.finish(trace_id, now_ms, outcome, degraded, stale_feeds).await;
        Ok(CycleReport {
            status,
            reading: Some(reading),
            event,
        })
    }

    /// Fan-out fetch of every feed, then fan-in into one snapshot. Only
    /// freshly downloaded bodies feed the normalization estimators.
    async fn collect(&self, now_ms: u64) -> FeedSnapshot {
        let fetches = self.requests.iter().map(|req| {
            let span = child_span("feed_fetch");
            async move {
                annotate_adapter(req.adapter.as_str());
                (req.adapter, self.fetcher.fetch(req, now_ms).await)
            }
            .instrument(span)
        });

        let results = warn_if_slow("feed_fan_in", Duration::from_secs(5), join_all(fetches)).await;

        let mut snapshot = FeedSnapshot::default();
        for (adapter, result) in results {
            self.absorb(&mut snapshot, adapter, result, now_ms);
        }
        snapshot
    }

    fn absorb(
        &self,
        snapshot: &mut FeedSnapshot,
        adapter: AdapterId,
        result: Result<FetchOutcome, FetchError>,
        now_ms: u64,
    ) {
        let outcome = match result {
            Ok(o) => o,
            Err(e) => {
                debug!(%adapter, error = %e, "feed unavailable");
                snapshot.mark_stale(adapter);
                return;
            }
        };

        let payload = match parse_payload(adapter, &outcome.body) {
            Ok(p) => p,
            Err(e) => {
                warn!(%adapter, error = %e, "feed body did not decode");
                snapshot.mark_stale(adapter);
                return;
            }
        };

        snapshot.insert(payload);
        if outcome.stale {
            snapshot.mark_stale(adapter);
        }

        if matches!(outcome.status, FetchStatus::Fresh(_)) {
            let mut norm = self.normalization.lock();
            for factor in Factor::ALL.iter().filter(|f| f.source() == adapter) {
                if let Some(value) = snapshot.factor_value(*factor) {
                    norm.update(*factor, FactorSample { value, ts_ms: now_ms });
                }
            }
        }
    }

    fn factor_inputs(&self, snapshot: &FeedSnapshot) -> Vec<FactorInput> {
        let norm = self.normalization.lock();
        Factor::ALL
            .iter()
            .map(|&factor| {
                let raw = snapshot.factor_value(factor);
                FactorInput {
                    factor,
                    raw,
                    normalized: raw
                        .map(|v| norm.normalize(factor, v))
                        .unwrap_or(NormalizedValue::NEUTRAL),
                }
            })
            .collect()
    }

    async fn finish(
        &self,
        trace_id: TraceId,
        now_ms: u64,
        outcome: CycleOutcome,
        degraded: bool,
        stale_feeds: Vec<AdapterId>,
    ) -> CycleStatus {
        let status = CycleStatus {
            trace_id: trace_id.as_str().to_string(),
            ts_ms: now_ms,
            outcome,
            degraded,
            stale_feeds,
        };
        info!(outcome = ?status.outcome, degraded, "cycle complete");
        self.view.publish_status(status.clone()).await;
        status
    }
}
