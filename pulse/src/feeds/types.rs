use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Daily spot ETF net flows, in USD notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfFlowPayload {
    /// Positive = net creations, negative = net redemptions.
    pub btc_net_flow_usd: f64,
    #[serde(default)]
    pub eth_net_flow_usd: Option<f64>,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesFxPayload {
    /// US 10y treasury yield, percent.
    pub us10y_yield_pct: f64,
    /// Dollar index level.
    pub dxy: f64,
    /// Dollar index change vs previous close, percent.
    pub dxy_change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicesPayload {
    pub vix: f64,
    #[serde(default)]
    pub spx_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub title: String,
    pub impact: Impact,
    pub starts_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalendarPayload {
    #[serde(default)]
    pub events: Vec<CalendarEntry>,
}

impl CalendarPayload {
    /// Next high-impact event starting at or after `now_ms`.
    pub fn next_high_impact(&self, now_ms: u64) -> Option<&CalendarEntry> {
        self.events
            .iter()
            .filter(|e| e.impact == Impact::High && e.starts_at.timestamp_millis() >= now_ms as i64)
            .min_by_key(|e| e.starts_at)
    }
}

/// A decoded feed body.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    EtfFlow(EtfFlowPayload),
    RatesFx(RatesFxPayload),
    Indices(IndicesPayload),
    Calendar(CalendarPayload),
}
