use serde::{Deserialize, Serialize};

use super::band::Band;
use crate::normalize::{Factor, NormalizedValue, Provenance};

/// Durable smoothed state, shared across instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WspsState {
    pub ema_score: u8,
    pub band: Band,
}

/// One factor as handed to the engine for scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorInput {
    pub factor: Factor,
    /// Latest raw observation, if the feed delivered one.
    pub raw: Option<f64>,
    pub normalized: NormalizedValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorBreakdown {
    pub factor: Factor,
    pub raw: Option<f64>,
    pub normalized: f64,
    pub weight: f64,
    pub provenance: Provenance,
}

/// What the read API serves: score, band and how they were derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WspsReading {
    pub raw_score: u8,
    pub ema_score: u8,
    pub band: Band,
    pub previous_band: Option<Band>,
    pub factors: Vec<FactorBreakdown>,
    /// At least one feed was stale this cycle.
    pub degraded: bool,
    /// No live durable state was found; ema and band were seeded from the raw score.
    pub reseeded: bool,
    pub ts_ms: u64,
}
