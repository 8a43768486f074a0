//! Streaming normalization of heterogeneous factor series into `[0, 1]`.
//!
//! Symmetric stress factors (volatility, rates, dollar) use a Welford
//! z-score, inverted so that higher stress gives a lower score. Skewed flow
//! factors use min-max scaling against streaming P5/P95 estimates.
//!
//! Every normalized value carries its [`Provenance`] so consumers can tell a
//! real estimate from a cold-start or degenerate-estimate default.

pub mod config;
pub mod quantile;
pub mod welford;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

pub use config::{GaussianFallback, NormalizationConfig, RangeFallback};
pub use quantile::{P2Quantile, QuantileSketch};
pub use welford::WelfordState;

use crate::feeds::AdapterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Vix,
    Us10y,
    Dxy,
    EtfBtcFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorKind {
    Symmetric,
    Skewed,
}

impl Factor {
    pub const ALL: [Factor; 4] = [Factor::Vix, Factor::Us10y, Factor::Dxy, Factor::EtfBtcFlow];

    pub fn kind(&self) -> FactorKind {
        match self {
            Factor::EtfBtcFlow => FactorKind::Skewed,
            Factor::Vix | Factor::Us10y | Factor::Dxy => FactorKind::Symmetric,
        }
    }

    /// Feed the factor is read from.
    pub fn source(&self) -> AdapterId {
        match self {
            Factor::Vix => AdapterId::Indices,
            Factor::Us10y | Factor::Dxy => AdapterId::RatesFx,
            Factor::EtfBtcFlow => AdapterId::EtfFlow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::Vix => "vix",
            Factor::Us10y => "us10y",
            Factor::Dxy => "dxy",
            Factor::EtfBtcFlow => "etf_btc_flow",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Estimated,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorSample {
    pub value: f64,
    pub ts_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedValue {
    pub value: f64,
    pub provenance: Provenance,
}

impl NormalizedValue {
    pub const NEUTRAL: NormalizedValue = NormalizedValue {
        value: 0.5,
        provenance: Provenance::Fallback,
    };
}

#[derive(Debug, Clone)]
enum Estimator {
    Welford(WelfordState),
    Quantiles(QuantileSketch),
}

#[derive(Debug, Clone)]
struct FactorState {
    estimator: Estimator,
    last_ts_ms: Option<u64>,
}

impl FactorState {
    fn for_kind(kind: FactorKind) -> Self {
        let estimator = match kind {
            FactorKind::Symmetric => Estimator::Welford(WelfordState::default()),
            FactorKind::Skewed => Estimator::Quantiles(QuantileSketch::default()),
        };
        Self {
            estimator,
            last_ts_ms: None,
        }
    }

    fn count(&self) -> u64 {
        match &self.estimator {
            Estimator::Welford(w) => w.count,
            Estimator::Quantiles(q) => q.count(),
        }
    }
}

/// Online per-factor estimators. Only moves forward: samples are folded in
/// and never removed.
pub struct NormalizationStore {
    config: NormalizationConfig,
    factors: HashMap<Factor, FactorState>,
}

impl NormalizationStore {
    pub fn new(config: NormalizationConfig) -> Self {
        let factors = Factor::ALL
            .iter()
            .map(|&f| (f, FactorState::for_kind(f.kind())))
            .collect();

        Self { config, factors }
    }

    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// O(1) fold of one observation. Non-finite samples are dropped.
    pub fn update(&mut self, factor: Factor, sample: FactorSample) {
        if !sample.value.is_finite() {
            return;
        }

        let state = self
            .factors
            .entry(factor)
            .or_insert_with(|| FactorState::for_kind(factor.kind()));

        match &mut state.estimator {
            Estimator::Welford(w) => w.update(sample.value),
            Estimator::Quantiles(q) => q.update(sample.value),
        }
        state.last_ts_ms = Some(sample.ts_ms);

        trace!(%factor, value = sample.value, count = state.count(), "sample folded");
    }

    pub fn count(&self, factor: Factor) -> u64 {
        self.factors.get(&factor).map(FactorState::count).unwrap_or(0)
    }

    pub fn last_sample_ms(&self, factor: Factor) -> Option<u64> {
        self.factors.get(&factor).and_then(|s| s.last_ts_ms)
    }

    /// Maps `value` into `[0, 1]` using the factor's current estimate.
    pub fn normalize(&self, factor: Factor, value: f64) -> NormalizedValue {
        let Some(state) = self.factors.get(&factor) else {
            return NormalizedValue::NEUTRAL;
        };
        if !value.is_finite() || state.count() < self.config.min_samples.max(2) {
            return NormalizedValue::NEUTRAL;
        }

        match &state.estimator {
            Estimator::Welford(w) => self.normalize_symmetric(factor, w, value),
            Estimator::Quantiles(q) => self.normalize_skewed(factor, q, value),
        }
    }

    fn normalize_symmetric(&self, factor: Factor, w: &WelfordState, value: f64) -> NormalizedValue {
        let (mean, std, provenance) = match w.std() {
            Some(std) if std >= self.config.min_std => (w.mean, std, Provenance::Estimated),
            _ => match self.config.gaussian_fallback(factor) {
                Some(fb) => (fb.mean, fb.std, Provenance::Fallback),
                None => return NormalizedValue::NEUTRAL,
            },
        };

        if !(std.is_finite() && std > 0.0 && mean.is_finite()) {
            return NormalizedValue::NEUTRAL;
        }

        let c = self.config.z_clamp;
        let z = ((value - mean) / std).clamp(-c, c);

        NormalizedValue {
            value: ((1.0 - z / c) / 2.0).clamp(0.0, 1.0),
            provenance,
        }
    }

    fn normalize_skewed(&self, factor: Factor, q: &QuantileSketch, value: f64) -> NormalizedValue {
        let (low, high, provenance) = match q.bounds() {
            Some((p5, p95)) if p95 - p5 >= self.config.min_span => (p5, p95, Provenance::Estimated),
            _ => match self.config.range_fallback(factor) {
                Some(fb) => (fb.low, fb.high, Provenance::Fallback),
                None => return NormalizedValue::NEUTRAL,
            },
        };

        if !(low.is_finite() && high.is_finite() && high > low) {
            return NormalizedValue::NEUTRAL;
        }

        NormalizedValue {
            value: ((value - low) / (high - low)).clamp(0.0, 1.0),
            provenance,
        }
    }
}
