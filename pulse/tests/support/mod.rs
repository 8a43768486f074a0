#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use pulse::adapter::{
    BreakerConfig, CachedFetcher, CircuitBreakerRegistry, FetchError, HttpRequest, HttpResponse,
    Transport,
};
use pulse::engine::AutoReactEngine;
use pulse::feeds::{AdapterId, FeedsConfig, feed_requests};
use pulse::metrics::{CycleCounters, FetchCounters};
use pulse::normalize::{NormalizationConfig, NormalizationStore};
use pulse::pulse_view::PulseView;
use pulse::rules::{RuleEngine, RulesConfig};
use pulse::state::{MemoryStateStore, StateStore};
use pulse::wsps::{WspsConfig, WspsEngine};

pub const BASE: &str = "http://feeds.test";

/// In-memory upstream: one scripted reply per URL, swappable between cycles.
#[derive(Default)]
pub struct ScriptedFeeds {
    replies: Mutex<HashMap<String, Result<String, u16>>>,
}

impl ScriptedFeeds {
    pub fn set(&self, adapter: AdapterId, body: &str) {
        self.replies
            .lock()
            .insert(url_for(adapter), Ok(body.to_string()));
    }

    pub fn fail(&self, adapter: AdapterId, status: u16) {
        self.replies.lock().insert(url_for(adapter), Err(status));
    }
}

#[async_trait]
impl Transport for ScriptedFeeds {
    async fn get(&self, req: &HttpRequest) -> Result<HttpResponse, FetchError> {
        match self.replies.lock().get(&req.url).cloned() {
            Some(Ok(body)) => Ok(HttpResponse {
                status: 200,
                etag: None,
                body,
            }),
            Some(Err(code)) => Err(FetchError::Status(code)),
            None => Err(FetchError::Status(404)),
        }
    }
}

pub fn url_for(adapter: AdapterId) -> String {
    FeedsConfig::with_base_url(BASE).endpoint(adapter).url.clone()
}

/// Feeds that, with a WSPS of 50 or more, trip FLUSH_REBOUND and nothing else.
pub fn flush_rebound_feeds() -> Arc<ScriptedFeeds> {
    let feeds = Arc::new(ScriptedFeeds::default());
    feeds.set(AdapterId::Indices, r#"{"vix": 24.0}"#);
    feeds.set(AdapterId::EtfFlow, r#"{"btc_net_flow_usd": 15000000.0}"#);
    feeds.set(
        AdapterId::RatesFx,
        r#"{"us10y_yield_pct": 4.1, "dxy": 104.0, "dxy_change_pct": 0.1}"#,
    );
    feeds.set(AdapterId::Calendar, r#"{"events": []}"#);
    feeds
}

/// Engine over scripted feeds with TTL 0, so every cycle refetches.
pub fn engine_with(
    feeds: Arc<ScriptedFeeds>,
    store: Arc<dyn StateStore>,
) -> AutoReactEngine {
    let mut feeds_cfg = FeedsConfig::with_base_url(BASE);
    for adapter in AdapterId::ALL {
        feeds_cfg.endpoint_mut(adapter).ttl_secs = 0;
    }

    let fetcher = CachedFetcher::new(
        feeds,
        Arc::new(CircuitBreakerRegistry::new(BreakerConfig::default())),
        FetchCounters::default(),
    );

    AutoReactEngine::new(
        fetcher,
        feed_requests(&feeds_cfg, None),
        NormalizationStore::new(NormalizationConfig::default()),
        WspsEngine::new(WspsConfig::default(), store.clone()),
        RuleEngine::new(&RulesConfig::default(), store.clone()),
        store,
        PulseView::new(),
        CycleCounters::default(),
    )
}

pub fn memory_store() -> Arc<dyn StateStore> {
    Arc::new(MemoryStateStore::new())
}

/// Seeds the durable WSPS state as if a previous cycle had scored `ema`.
pub async fn seed_wsps(store: &Arc<dyn StateStore>, ema: u8, band: &str, now_ms: u64) {
    store
        .put(
            "wsps:state",
            &format!(r#"{{"ema_score": {ema}, "band": "{band}"}}"#),
            3_600_000,
            now_ms,
        )
        .await
        .unwrap();
}
