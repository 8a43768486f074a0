//! WSPS composite engine.
//!
//! raw score (weighted sum) -> EMA smoothing -> hysteresis banding, with the
//! smoothed state kept in the shared [`StateStore`] under a bounded TTL.

pub mod band;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

pub use band::{Band, BandThresholds, band_for, classify};
pub use types::{FactorBreakdown, FactorInput, WspsReading, WspsState};

use crate::normalize::Factor;
use crate::state::StateStore;
use common::logger::warn_if_slow;

pub const WSPS_STATE_KEY: &str = "wsps:state";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WspsConfig {
    /// Must cover every factor and sum to 1.0.
    pub weights: BTreeMap<Factor, f64>,
    /// EMA smoothing factor in `(0, 1]`.
    pub alpha: f64,
    pub thresholds: BandThresholds,
    /// Durable state older than this is ignored and reseeded.
    pub state_ttl_secs: u64,
}

impl Default for WspsConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::from([
                (Factor::Vix, 0.35),
                (Factor::EtfBtcFlow, 0.30),
                (Factor::Dxy, 0.20),
                (Factor::Us10y, 0.15),
            ]),
            alpha: 0.2,
            thresholds: BandThresholds::default(),
            state_ttl_secs: 3_600,
        }
    }
}

/// `round(100 * sum(value * weight))`, clamped to `0..=100`. A factor with
/// no input, or a non-finite one, counts as neutral (0.5).
pub fn score(inputs: &BTreeMap<Factor, f64>, weights: &BTreeMap<Factor, f64>) -> u8 {
    let total: f64 = weights
        .iter()
        .map(|(f, w)| {
            let v = inputs.get(f).copied().filter(|v| v.is_finite()).unwrap_or(0.5);
            v.clamp(0.0, 1.0) * w
        })
        .sum();

    (total * 100.0).round().clamp(0.0, 100.0) as u8
}

/// `round(alpha * raw + (1 - alpha) * prev)`, seeded from `raw`.
pub fn smooth(raw: u8, prev: Option<u8>, alpha: f64) -> u8 {
    match prev {
        None => raw,
        Some(prev) => {
            let ema = alpha * f64::from(raw) + (1.0 - alpha) * f64::from(prev);
            ema.round().clamp(0.0, 100.0) as u8
        }
    }
}

pub struct WspsEngine {
    config: WspsConfig,
    store: Arc<dyn StateStore>,
}

impl WspsEngine {
    pub fn new(config: WspsConfig, store: Arc<dyn StateStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &WspsConfig {
        &self.config
    }

    /// One scoring step: one durable read, one durable write.
    #[instrument(skip(self, inputs), target = "wsps")]
    pub async fn evaluate(
        &self,
        inputs: &[FactorInput],
        degraded: bool,
        now_ms: u64,
    ) -> anyhow::Result<WspsReading> {
        let normalized: BTreeMap<Factor, f64> = inputs
            .iter()
            .map(|i| (i.factor, i.normalized.value))
            .collect();

        let raw_score = score(&normalized, &self.config.weights);
        let prev = self.load_state(now_ms).await?;

        let (ema_score, band) = match prev {
            Some(p) => {
                let ema = smooth(raw_score, Some(p.ema_score), self.config.alpha);
                (ema, classify(ema, p.band, &self.config.thresholds))
            }
            None => (raw_score, band_for(raw_score, &self.config.thresholds)),
        };

        // A factor with no observation scores as neutral; folding that into the
        // smoothed state would pull the next healthy cycle toward 50.
        let missing = inputs.iter().filter(|i| i.raw.is_none()).count();
        if missing == 0 {
            let state = WspsState { ema_score, band };
            let encoded = serde_json::to_string(&state)?;
            warn_if_slow("wsps_state_write", Duration::from_millis(50), async {
                self.store
                    .put(
                        WSPS_STATE_KEY,
                        &encoded,
                        self.config.state_ttl_secs.saturating_mul(1_000),
                        now_ms,
                    )
                    .await
            })
            .await
            .context("persist wsps state")?;
        } else {
            debug!(missing, "wsps state not persisted for partial inputs");
        }

        let previous_band = prev.map(|p| p.band);
        if previous_band.is_some_and(|b| b != band) {
            info!(from = ?previous_band, to = ?band, ema_score, "wsps band changed");
        }
        debug!(raw_score, ema_score, ?band, reseeded = prev.is_none(), "wsps scored");

        let factors = inputs
            .iter()
            .map(|i| FactorBreakdown {
                factor: i.factor,
                raw: i.raw,
                normalized: i.normalized.value,
                weight: self.config.weights.get(&i.factor).copied().unwrap_or(0.0),
                provenance: i.normalized.provenance,
            })
            .collect();

        Ok(WspsReading {
            raw_score,
            ema_score,
            band,
            previous_band,
            factors,
            degraded,
            reseeded: prev.is_none(),
            ts_ms: now_ms,
        })
    }

    async fn load_state(&self, now_ms: u64) -> anyhow::Result<Option<WspsState>> {
        let raw = warn_if_slow("wsps_state_read", Duration::from_millis(50), async {
            self.store.get(WSPS_STATE_KEY, now_ms).await
        })
        .await
        .context("load wsps state")?;

        Ok(raw.and_then(|s| match serde_json::from_str::<WspsState>(&s) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "unreadable wsps state; reseeding");
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{NormalizedValue, Provenance};
    use crate::state::MemoryStateStore;

    fn inputs(v: f64) -> Vec<FactorInput> {
        Factor::ALL
            .iter()
            .map(|&factor| FactorInput {
                factor,
                raw: Some(1.0),
                normalized: NormalizedValue {
                    value: v,
                    provenance: Provenance::Estimated,
                },
            })
            .collect()
    }

    fn engine(store: Arc<MemoryStateStore>) -> WspsEngine {
        WspsEngine::new(WspsConfig::default(), store)
    }

    #[test]
    fn score_is_weighted_and_rounded() {
        let weights = WspsConfig::default().weights;
        let inputs = BTreeMap::from([
            (Factor::Vix, 1.0),
            (Factor::EtfBtcFlow, 0.0),
            (Factor::Dxy, 0.4),
            (Factor::Us10y, 0.6),
        ]);
        // 35 + 0 + 8 + 9
        assert_eq!(score(&inputs, &weights), 52);
    }

    #[test]
    fn missing_inputs_count_as_neutral() {
        assert_eq!(score(&BTreeMap::new(), &WspsConfig::default().weights), 50);
    }

    #[test]
    fn non_finite_inputs_count_as_neutral() {
        let weights = WspsConfig::default().weights;
        let mut inputs: BTreeMap<Factor, f64> = Factor::ALL.iter().map(|&f| (f, 0.5)).collect();
        inputs.insert(Factor::Vix, f64::NAN);
        assert_eq!(score(&inputs, &weights), 50);
    }

    #[test]
    fn smoothing_seeds_then_blends() {
        assert_eq!(smooth(80, None, 0.2), 80);
        // 0.2 * 80 + 0.8 * 50 = 56
        assert_eq!(smooth(80, Some(50), 0.2), 56);
        assert_eq!(smooth(0, Some(100), 1.0), 0);
    }

    #[tokio::test]
    async fn first_reading_is_seeded_from_raw() {
        let e = engine(Arc::new(MemoryStateStore::new()));
        let r = e.evaluate(&inputs(0.8), false, 0).await.unwrap();

        assert!(r.reseeded);
        assert_eq!((r.raw_score, r.ema_score, r.band), (80, 80, Band::Green));
        assert_eq!(r.previous_band, None);
        assert_eq!(r.factors.len(), 4);
    }

    #[tokio::test]
    async fn later_readings_are_smoothed_and_hysteretic() {
        let store = Arc::new(MemoryStateStore::new());
        let e = engine(store.clone());
        store
            .put(
                WSPS_STATE_KEY,
                &serde_json::to_string(&WspsState {
                    ema_score: 66,
                    band: Band::Yellow,
                })
                .unwrap(),
                60_000,
                0,
            )
            .await
            .unwrap();

        // 0.2 * 80 + 0.8 * 66 = 68.8 -> 69: above green, inside margin
        let r = e.evaluate(&inputs(0.8), false, 1_000).await.unwrap();
        assert_eq!(r.ema_score, 69);
        assert_eq!(r.band, Band::Yellow);
        assert!(!r.reseeded);

        // 0.2 * 80 + 0.8 * 69 = 71.2 -> 71
        let r = e.evaluate(&inputs(0.8), false, 2_000).await.unwrap();
        assert_eq!(r.ema_score, 71);
        assert_eq!(r.band, Band::Green);
        assert_eq!(r.previous_band, Some(Band::Yellow));
    }

    #[tokio::test]
    async fn expired_state_is_reseeded() {
        let store = Arc::new(MemoryStateStore::new());
        let e = engine(store);
        e.evaluate(&inputs(0.2), false, 0).await.unwrap();

        let ttl_ms = WspsConfig::default().state_ttl_secs * 1_000;
        let r = e.evaluate(&inputs(0.8), false, ttl_ms).await.unwrap();

        assert!(r.reseeded);
        assert_eq!(r.ema_score, 80);
    }

    #[tokio::test]
    async fn partial_inputs_do_not_move_the_stored_ema() {
        let store = Arc::new(MemoryStateStore::new());
        let e = engine(store.clone());
        let seeded = serde_json::to_string(&WspsState {
            ema_score: 66,
            band: Band::Yellow,
        })
        .unwrap();
        store.put(WSPS_STATE_KEY, &seeded, 600_000, 0).await.unwrap();

        let mut partial = inputs(0.8);
        partial[0].raw = None;
        partial[0].normalized = NormalizedValue::NEUTRAL;
        let r = e.evaluate(&partial, true, 1_000).await.unwrap();
        assert!(r.degraded);
        assert!(!r.reseeded);

        assert_eq!(
            store.get(WSPS_STATE_KEY, 2_000).await.unwrap().as_deref(),
            Some(seeded.as_str())
        );

        // the next complete cycle blends from 66, not from the degraded reading
        let r = e.evaluate(&inputs(0.8), false, 60_000).await.unwrap();
        assert_eq!(r.ema_score, 69);
    }

    #[tokio::test]
    async fn corrupt_state_is_treated_as_absent() {
        let store = Arc::new(MemoryStateStore::new());
        store.put(WSPS_STATE_KEY, "not json", 60_000, 0).await.unwrap();

        let r = engine(store).evaluate(&inputs(0.5), true, 1).await.unwrap();
        assert!(r.reseeded);
        assert!(r.degraded);
        assert_eq!(r.band, Band::Yellow);
    }
}
