use serde::{Deserialize, Serialize};

use super::Factor;

/// Static `{mean, std}` used when a symmetric factor's estimate is degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianFallback {
    pub mean: f64,
    pub std: f64,
}

/// Static absolute range used when a skewed factor's P5..P95 span collapses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeFallback {
    pub low: f64,
    pub high: f64,
}

/// Every constant the normalization store may fall back to, in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// z-scores are clamped to `[-z_clamp, z_clamp]` before mapping to `[0, 1]`.
    pub z_clamp: f64,
    /// Samples required before an estimator is trusted.
    pub min_samples: u64,
    /// Below this standard deviation the estimate counts as degenerate.
    pub min_std: f64,
    /// Below this P95 - P5 span the estimate counts as degenerate.
    pub min_span: f64,

    pub vix: GaussianFallback,
    pub us10y: GaussianFallback,
    pub dxy: GaussianFallback,
    pub etf_btc_flow: RangeFallback,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            z_clamp: 2.5,
            min_samples: 2,
            min_std: 1e-9,
            min_span: 1.0,
            vix: GaussianFallback { mean: 19.5, std: 6.0 },
            us10y: GaussianFallback { mean: 4.0, std: 0.6 },
            dxy: GaussianFallback { mean: 103.0, std: 3.0 },
            etf_btc_flow: RangeFallback {
                low: -500e6,
                high: 500e6,
            },
        }
    }
}

impl NormalizationConfig {
    pub fn gaussian_fallback(&self, factor: Factor) -> Option<GaussianFallback> {
        match factor {
            Factor::Vix => Some(self.vix),
            Factor::Us10y => Some(self.us10y),
            Factor::Dxy => Some(self.dxy),
            Factor::EtfBtcFlow => None,
        }
    }

    pub fn range_fallback(&self, factor: Factor) -> Option<RangeFallback> {
        match factor {
            Factor::EtfBtcFlow => Some(self.etf_btc_flow),
            _ => None,
        }
    }
}
