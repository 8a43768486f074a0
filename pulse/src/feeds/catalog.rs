//! Feed endpoints, body decoding and the per-cycle snapshot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{AdapterId, CalendarPayload, EtfFlowPayload, FeedPayload, IndicesPayload, RatesFxPayload};
use crate::adapter::FeedRequest;
use crate::normalize::Factor;

/// Where and how often to fetch a single feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEndpoint {
    pub url: String,
    /// Cache freshness window. Within it the adapter serves the cached body
    /// without touching the network.
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub etf_flow: FeedEndpoint,
    pub rates_fx: FeedEndpoint,
    pub indices: FeedEndpoint,
    pub calendar: FeedEndpoint,
}

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8700";

impl Default for FeedsConfig {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }
}

impl FeedsConfig {
    /// Standard feed paths under one host, default TTLs.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            etf_flow: FeedEndpoint {
                url: format!("{base}/v1/etf-flows/latest"),
                ttl_secs: 300,
            },
            rates_fx: FeedEndpoint {
                url: format!("{base}/v1/rates-fx/latest"),
                ttl_secs: 120,
            },
            // Below the poll period so every tick refreshes VIX.
            indices: FeedEndpoint {
                url: format!("{base}/v1/indices/latest"),
                ttl_secs: 45,
            },
            calendar: FeedEndpoint {
                url: format!("{base}/v1/calendar/upcoming"),
                ttl_secs: 900,
            },
        }
    }

    pub fn endpoint(&self, adapter: AdapterId) -> &FeedEndpoint {
        match adapter {
            AdapterId::EtfFlow => &self.etf_flow,
            AdapterId::RatesFx => &self.rates_fx,
            AdapterId::Indices => &self.indices,
            AdapterId::Calendar => &self.calendar,
        }
    }

    pub fn endpoint_mut(&mut self, adapter: AdapterId) -> &mut FeedEndpoint {
        match adapter {
            AdapterId::EtfFlow => &mut self.etf_flow,
            AdapterId::RatesFx => &mut self.rates_fx,
            AdapterId::Indices => &mut self.indices,
            AdapterId::Calendar => &mut self.calendar,
        }
    }
}

/// Builds one request per feed. `api_key`, when present, is sent as
/// `X-Api-Key` on every request.
pub fn feed_requests(cfg: &FeedsConfig, api_key: Option<&str>) -> Vec<FeedRequest> {
    AdapterId::ALL
        .iter()
        .map(|&adapter| {
            let ep = cfg.endpoint(adapter);
            let headers = api_key
                .map(|k| vec![("X-Api-Key".to_string(), k.to_string())])
                .unwrap_or_default();

            FeedRequest {
                adapter,
                url: ep.url.clone(),
                cache_key: format!("feed:{}", adapter),
                ttl_secs: ep.ttl_secs,
                headers,
            }
        })
        .collect()
}

pub fn parse_payload(adapter: AdapterId, body: &str) -> Result<FeedPayload, serde_json::Error> {
    Ok(match adapter {
        AdapterId::EtfFlow => FeedPayload::EtfFlow(serde_json::from_str(body)?),
        AdapterId::RatesFx => FeedPayload::RatesFx(serde_json::from_str(body)?),
        AdapterId::Indices => FeedPayload::Indices(serde_json::from_str(body)?),
        AdapterId::Calendar => FeedPayload::Calendar(serde_json::from_str(body)?),
    })
}

/// Everything fetched in one cycle.
///
/// A feed can carry a payload and still be stale (served from cache after a
/// failed or blocked refresh). A feed with no payload at all is always stale.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub etf_flow: Option<EtfFlowPayload>,
    pub rates_fx: Option<RatesFxPayload>,
    pub indices: Option<IndicesPayload>,
    pub calendar: Option<CalendarPayload>,
    pub stale: BTreeSet<AdapterId>,
}

impl FeedSnapshot {
    pub fn insert(&mut self, payload: FeedPayload) {
        match payload {
            FeedPayload::EtfFlow(p) => self.etf_flow = Some(p),
            FeedPayload::RatesFx(p) => self.rates_fx = Some(p),
            FeedPayload::Indices(p) => self.indices = Some(p),
            FeedPayload::Calendar(p) => self.calendar = Some(p),
        }
    }

    pub fn mark_stale(&mut self, adapter: AdapterId) {
        self.stale.insert(adapter);
    }

    pub fn is_stale(&self, adapter: AdapterId) -> bool {
        self.stale.contains(&adapter)
    }

    pub fn is_degraded(&self) -> bool {
        !self.stale.is_empty()
    }

    /// Raw observation for a normalization factor, if its feed delivered one.
    pub fn factor_value(&self, factor: Factor) -> Option<f64> {
        match factor {
            Factor::Vix => self.indices.as_ref().map(|p| p.vix),
            Factor::Us10y => self.rates_fx.as_ref().map(|p| p.us10y_yield_pct),
            Factor::Dxy => self.rates_fx.as_ref().map(|p| p.dxy),
            Factor::EtfBtcFlow => self.etf_flow.as_ref().map(|p| p.btc_net_flow_usd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_request_per_feed_with_distinct_cache_keys() {
        let reqs = feed_requests(&FeedsConfig::default(), Some("secret"));

        assert_eq!(reqs.len(), 4);
        let keys: BTreeSet<_> = reqs.iter().map(|r| r.cache_key.clone()).collect();
        assert_eq!(keys.len(), 4);
        assert!(
            reqs.iter()
                .all(|r| r.headers == vec![("X-Api-Key".to_string(), "secret".to_string())])
        );
    }

    #[test]
    fn base_url_is_joined_without_double_slash() {
        let cfg = FeedsConfig::with_base_url("https://feeds.example.com/");
        assert_eq!(cfg.indices.url, "https://feeds.example.com/v1/indices/latest");
        assert_eq!(cfg.calendar.ttl_secs, 900);
    }

    #[test]
    fn parses_each_feed_shape() {
        let etf = parse_payload(AdapterId::EtfFlow, r#"{"btc_net_flow_usd": 15000000.0}"#).unwrap();
        assert!(matches!(etf, FeedPayload::EtfFlow(p) if p.btc_net_flow_usd == 15e6));

        let rates = parse_payload(
            AdapterId::RatesFx,
            r#"{"us10y_yield_pct": 4.2, "dxy": 104.1, "dxy_change_pct": 0.1}"#,
        )
        .unwrap();
        assert!(matches!(rates, FeedPayload::RatesFx(p) if p.dxy == 104.1));

        let cal = parse_payload(
            AdapterId::Calendar,
            r#"{"events":[{"title":"CPI","impact":"high","starts_at":"2026-01-14T13:30:00Z"}]}"#,
        )
        .unwrap();
        assert!(matches!(cal, FeedPayload::Calendar(p) if p.events.len() == 1));
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_payload(AdapterId::Indices, r#"{"spx_change_pct": 1.0}"#).is_err());
    }

    #[test]
    fn snapshot_maps_factors_to_feeds() {
        let mut snap = FeedSnapshot::default();
        snap.insert(FeedPayload::Indices(IndicesPayload {
            vix: 24.0,
            spx_change_pct: None,
        }));

        assert_eq!(snap.factor_value(Factor::Vix), Some(24.0));
        assert_eq!(snap.factor_value(Factor::Dxy), None);
        assert!(!snap.is_degraded());

        snap.mark_stale(AdapterId::RatesFx);
        assert!(snap.is_stale(AdapterId::RatesFx));
        assert!(snap.is_degraded());
    }
}
