use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feeds::{AdapterId, FeedSnapshot};
use crate::normalize::Factor;
use crate::wsps::{Band, WspsReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    CapitulationDefense,
    FlushRebound,
    MacroEventHold,
    DollarSqueeze,
    MomentumAdd,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CapitulationDefense => "CAPITULATION_DEFENSE",
            EventKind::FlushRebound => "FLUSH_REBOUND",
            EventKind::MacroEventHold => "MACRO_EVENT_HOLD",
            EventKind::DollarSqueeze => "DOLLAR_SQUEEZE",
            EventKind::MomentumAdd => "MOMENTUM_ADD",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tactical signal. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub rationale: Vec<String>,
    pub sizing_note: String,
    pub guardrails: Vec<String>,
    pub ts_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub cooldown_expires_at_ms: u64,
}

/// Durable cooldown marker for one event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub event_kind: EventKind,
    pub expires_at_ms: u64,
}

/// Flat view of one cycle's feeds and score, as seen by the rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleInputs {
    pub vix: Option<f64>,
    pub etf_btc_flow_usd: Option<f64>,
    pub us10y_yield_pct: Option<f64>,
    pub dxy_change_pct: Option<f64>,
    /// Minutes until the next high-impact calendar event, if one is scheduled.
    pub minutes_to_high_impact: Option<f64>,
    pub next_event_title: Option<String>,
    pub wsps_score: u8,
    pub wsps_band: Band,
}

impl RuleInputs {
    pub fn from_cycle(snapshot: &FeedSnapshot, reading: &WspsReading, now_ms: u64) -> Self {
        let next = snapshot
            .calendar
            .as_ref()
            .and_then(|c| c.next_high_impact(now_ms));

        Self {
            vix: snapshot.factor_value(Factor::Vix),
            etf_btc_flow_usd: snapshot.factor_value(Factor::EtfBtcFlow),
            us10y_yield_pct: snapshot.factor_value(Factor::Us10y),
            dxy_change_pct: snapshot.rates_fx.as_ref().map(|r| r.dxy_change_pct),
            minutes_to_high_impact: next.map(|e| {
                (e.starts_at.timestamp_millis() - now_ms as i64) as f64 / 60_000.0
            }),
            next_event_title: next.map(|e| e.title.clone()),
            wsps_score: reading.ema_score,
            wsps_band: reading.band,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rationale: Vec<String>,
    pub sizing_note: String,
}

/// A single multi-factor condition. Pure: no I/O, no clock.
pub trait Rule: Send + Sync {
    fn kind(&self) -> EventKind;

    /// Feeds the predicate reads. A stale one suppresses evaluation.
    fn feeds(&self) -> &'static [AdapterId];

    fn evaluate(&self, inputs: &RuleInputs) -> Option<RuleMatch>;
}
