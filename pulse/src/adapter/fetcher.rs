//! Cached, circuit-guarded feed fetches.
//!
//! Order of checks for one fetch:
//! 1. fresh cache entry (within TTL) => served without network I/O
//! 2. open circuit => last cached body, flagged stale
//! 3. conditional GET with the stored ETag
//!
//! Transport failures never escape while a cached body exists; they only
//! surface as `stale = true`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::breaker::CircuitBreakerRegistry;
use super::cache::{CacheEntry, ResponseCache};
use super::errors::FetchError;
use super::transport::{HttpRequest, Transport};
use crate::feeds::AdapterId;
use crate::metrics::FetchCounters;
use common::logger::warn_if_slow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub adapter: AdapterId,
    pub url: String,
    pub cache_key: String,
    pub ttl_secs: u64,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    CacheHit,
    CircuitOpen,
    NotModified,
    Fresh(u16),
    Error,
}

impl FetchStatus {
    pub fn label(&self) -> String {
        match self {
            FetchStatus::CacheHit => "cache_hit".to_string(),
            FetchStatus::CircuitOpen => "circuit_open".to_string(),
            FetchStatus::NotModified => "304".to_string(),
            FetchStatus::Fresh(code) => code.to_string(),
            FetchStatus::Error => "error".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub body: String,
    pub status: FetchStatus,
    pub stale: bool,
}

pub struct CachedFetcher {
    transport: Arc<dyn Transport>,
    breakers: Arc<CircuitBreakerRegistry>,
    cache: ResponseCache,
    counters: FetchCounters,
}

impl CachedFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        breakers: Arc<CircuitBreakerRegistry>,
        counters: FetchCounters,
    ) -> Self {
        Self {
            transport,
            breakers,
            cache: ResponseCache::new(),
            counters,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn counters(&self) -> &FetchCounters {
        &self.counters
    }

    pub fn cached(&self, cache_key: &str) -> Option<CacheEntry> {
        self.cache.get(cache_key)
    }

    #[instrument(
        skip(self, req),
        target = "fetch",
        fields(adapter = %req.adapter, cache_key = %req.cache_key)
    )]
    pub async fn fetch(&self, req: &FeedRequest, now_ms: u64) -> Result<FetchOutcome, FetchError> {
        let started = Instant::now();
        let cached = self.cache.get(&req.cache_key);

        if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh(now_ms)) {
            self.record(req.adapter, FetchStatus::CacheHit, started);
            debug!("serving fresh cache entry");
            return Ok(FetchOutcome {
                body: entry.body.clone(),
                status: FetchStatus::CacheHit,
                stale: false,
            });
        }

        // Synchronous gate; nothing below this line runs for a blocked adapter.
        if !self.breakers.can_pass(req.adapter, now_ms) {
            self.record(req.adapter, FetchStatus::CircuitOpen, started);
            return match self.cache.mark_stale(&req.cache_key) {
                Some(entry) => {
                    warn!("circuit open; serving stale cache entry");
                    Ok(FetchOutcome {
                        body: entry.body,
                        status: FetchStatus::CircuitOpen,
                        stale: true,
                    })
                }
                None => {
                    warn!("circuit open and nothing cached");
                    Err(FetchError::CircuitOpen(req.adapter))
                }
            };
        }

        let http_req = HttpRequest {
            url: req.url.clone(),
            headers: req.headers.clone(),
            etag: cached.as_ref().and_then(|e| e.etag.clone()),
        };

        let result = warn_if_slow("feed_fetch", Duration::from_secs(2), async {
            self.transport.get(&http_req).await
        })
        .await;

        match result {
            Ok(resp) if resp.status == 304 => match self.cache.touch(&req.cache_key, now_ms) {
                Some(entry) => {
                    self.breakers.report_success(req.adapter);
                    self.record(req.adapter, FetchStatus::NotModified, started);
                    debug!("upstream not modified; cache refreshed");
                    Ok(FetchOutcome {
                        body: entry.body,
                        status: FetchStatus::NotModified,
                        stale: false,
                    })
                }
                // 304 without a cached body is unusable.
                None => self.on_failure(req, FetchError::Status(304), now_ms, started),
            },
            Ok(resp) => {
                self.cache.put(CacheEntry {
                    key: req.cache_key.clone(),
                    etag: resp.etag,
                    body: resp.body.clone(),
                    fetched_at_ms: now_ms,
                    ttl_secs: req.ttl_secs,
                    stale: false,
                });
                self.breakers.report_success(req.adapter);
                self.record(req.adapter, FetchStatus::Fresh(resp.status), started);
                info!(
                    status = resp.status,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "feed refreshed"
                );
                Ok(FetchOutcome {
                    body: resp.body,
                    status: FetchStatus::Fresh(resp.status),
                    stale: false,
                })
            }
            Err(e) => self.on_failure(req, e, now_ms, started),
        }
    }

    fn on_failure(
        &self,
        req: &FeedRequest,
        err: FetchError,
        now_ms: u64,
        started: Instant,
    ) -> Result<FetchOutcome, FetchError> {
        let backoff_ms = self.breakers.next_backoff_ms(req.adapter);
        let state = self.breakers.report_failure(req.adapter, backoff_ms, now_ms);
        self.record(req.adapter, FetchStatus::Error, started);

        match self.cache.mark_stale(&req.cache_key) {
            Some(entry) => {
                warn!(error = %err, breaker = ?state, "feed refresh failed; serving stale cache entry");
                Ok(FetchOutcome {
                    body: entry.body,
                    status: FetchStatus::Error,
                    stale: true,
                })
            }
            None => {
                warn!(error = %err, breaker = ?state, "feed refresh failed with nothing cached");
                Err(err)
            }
        }
    }

    fn record(&self, adapter: AdapterId, status: FetchStatus, started: Instant) {
        let latency = started.elapsed();
        self.counters.record(adapter, &status, latency);
        debug!(
            outcome = %status.label(),
            latency_ms = latency.as_millis() as u64,
            "fetch outcome recorded"
        );
    }
}
