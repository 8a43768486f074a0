use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::BreakerConfig;
use crate::engine::POLL_INTERVAL;
use crate::error::ConfigError;
use crate::feeds::FeedsConfig;
use crate::normalize::{Factor, NormalizationConfig};
use crate::rules::RulesConfig;
use crate::wsps::WspsConfig;

/// Tunables of the pipeline itself. Loaded from the JSON file named by
/// `PULSE_CONFIG`; every section falls back to its defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Auto-react tick period.
    pub poll_interval_secs: u64,
    pub feeds: FeedsConfig,
    pub breaker: BreakerConfig,
    pub normalization: NormalizationConfig,
    pub wsps: WspsConfig,
    pub rules: RulesConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: POLL_INTERVAL.as_secs(),
            feeds: FeedsConfig::default(),
            breaker: BreakerConfig::default(),
            normalization: NormalizationConfig::default(),
            wsps: WspsConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

impl PulseConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: display,
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // =========================
        // WSPS weights
        // =========================
        let weights = &self.wsps.weights;
        for f in Factor::ALL {
            if !weights.contains_key(&f) {
                return Err(ConfigError::MissingWeight(f.to_string()));
            }
        }
        if let Some((f, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(ConfigError::InvalidWeights(format!("{f} has weight {w}")));
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidWeights(format!("weights sum to {sum}, expected 1")));
        }

        // =========================
        // Banding and smoothing
        // =========================
        let t = &self.wsps.thresholds;
        if t.green > 100 || t.yellow > 100 {
            return Err(ConfigError::InvalidThresholds("thresholds must be within 0..=100".into()));
        }
        if t.yellow >= t.green {
            return Err(ConfigError::InvalidThresholds(format!(
                "yellow ({}) must be below green ({})",
                t.yellow, t.green
            )));
        }
        if u16::from(t.margin) * 2 > u16::from(t.green - t.yellow) {
            return Err(ConfigError::InvalidThresholds(format!(
                "margin {} too wide for a yellow band of {}",
                t.margin,
                t.green - t.yellow
            )));
        }
        let alpha = self.wsps.alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        if self.wsps.state_ttl_secs == 0 {
            return Err(ConfigError::Invalid("wsps.state_ttl_secs must be > 0".into()));
        }

        // =========================
        // Rules, breaker, normalization
        // =========================
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be > 0".into()));
        }
        if self.rules.cooldown_secs == 0 {
            return Err(ConfigError::Invalid("rules.cooldown_secs must be > 0".into()));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid("breaker.failure_threshold must be > 0".into()));
        }
        let policies = std::iter::once(&self.breaker.backoff).chain(self.breaker.overrides.values());
        for p in policies {
            if p.base_ms == 0 || p.base_ms > p.max_ms {
                return Err(ConfigError::Invalid(format!(
                    "backoff base {}ms must be > 0 and <= max {}ms",
                    p.base_ms, p.max_ms
                )));
            }
        }
        let n = &self.normalization;
        if !(n.z_clamp.is_finite() && n.z_clamp > 0.0) {
            return Err(ConfigError::Invalid("normalization.z_clamp must be > 0".into()));
        }
        if !(n.min_std.is_finite() && n.min_std >= 0.0) {
            return Err(ConfigError::Invalid("normalization.min_std must be >= 0".into()));
        }
        if !(n.min_span.is_finite() && n.min_span >= 0.0) {
            return Err(ConfigError::Invalid("normalization.min_span must be >= 0".into()));
        }
        for f in Factor::ALL {
            if let Some(fb) = n.gaussian_fallback(f) {
                if !(fb.mean.is_finite() && fb.std.is_finite() && fb.std > 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "normalization fallback for {f} needs a finite mean and std > 0, got {}/{}",
                        fb.mean, fb.std
                    )));
                }
            }
            if let Some(fb) = n.range_fallback(f) {
                if !(fb.low.is_finite() && fb.high.is_finite() && fb.low < fb.high) {
                    return Err(ConfigError::Invalid(format!(
                        "normalization range for {f} needs low < high, got {}..{}",
                        fb.low, fb.high
                    )));
                }
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string. Shared by every dashboard instance.
    pub database_url: String,

    /// Address the read API listens on.
    pub bind_addr: SocketAddr,

    /// JSON log output for log shipping (`APP_ENV=production`).
    pub json_logs: bool,

    /// Sent as `X-Api-Key` to every feed when set.
    pub feed_api_key: Option<String>,

    /// Per-request upstream timeout.
    pub http_timeout: Duration,

    pub pulse: PulseConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://pulse_dev.db?mode=rwc".to_string());

        let bind_addr = env_or("PULSE_BIND_ADDR", "0.0.0.0:8080")
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidEnv {
                var: "PULSE_BIND_ADDR",
                reason: e.to_string(),
            })?;

        let http_timeout_ms: u64 = env_or("PULSE_HTTP_TIMEOUT_MS", "5000")
            .parse()
            .map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
                var: "PULSE_HTTP_TIMEOUT_MS",
                reason: e.to_string(),
            })?;

        let mut pulse = match std::env::var("PULSE_CONFIG") {
            Ok(path) => PulseConfig::from_file(Path::new(&path))?,
            Err(_) => PulseConfig::default(),
        };

        // Host override keeps per-feed TTLs from the file.
        if let Ok(base) = std::env::var("PULSE_FEED_BASE_URL") {
            let rebased = FeedsConfig::with_base_url(&base);
            for adapter in crate::feeds::AdapterId::ALL {
                pulse.feeds.endpoint_mut(adapter).url = rebased.endpoint(adapter).url.clone();
            }
        }

        pulse.validate()?;

        Ok(Self {
            database_url,
            bind_addr,
            json_logs: std::env::var("APP_ENV").is_ok_and(|v| v == "production"),
            feed_api_key: std::env::var("PULSE_FEED_API_KEY").ok().filter(|k| !k.is_empty()),
            http_timeout: Duration::from_millis(http_timeout_ms),
            pulse,
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PulseConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_missing_weight() {
        let mut c = PulseConfig::default();
        c.wsps.weights.remove(&Factor::Dxy);
        assert!(matches!(c.validate(), Err(ConfigError::MissingWeight(f)) if f == "dxy"));
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut c = PulseConfig::default();
        c.wsps.weights.insert(Factor::Vix, 0.5);
        assert!(matches!(c.validate(), Err(ConfigError::InvalidWeights(_))));
    }

    #[test]
    fn rejects_inverted_or_overlapping_bands() {
        let mut c = PulseConfig::default();
        c.wsps.thresholds.yellow = 70;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidThresholds(_))));

        let mut c = PulseConfig::default();
        c.wsps.thresholds.margin = 20;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidThresholds(_))));
    }

    #[test]
    fn rejects_bad_alpha_cooldown_and_backoff() {
        let mut c = PulseConfig::default();
        c.wsps.alpha = 0.0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidAlpha(_))));

        let mut c = PulseConfig::default();
        c.rules.cooldown_secs = 0;
        assert!(c.validate().is_err());

        let mut c = PulseConfig::default();
        c.breaker.backoff.base_ms = c.breaker.backoff.max_ms + 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_gaussian_fallbacks() {
        for std in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut c = PulseConfig::default();
            c.normalization.vix.std = std;
            assert!(
                matches!(c.validate(), Err(ConfigError::Invalid(ref m)) if m.contains("vix")),
                "std {std} accepted"
            );
        }

        let mut c = PulseConfig::default();
        c.normalization.dxy.mean = f64::NAN;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_inverted_or_empty_range_fallback() {
        let mut c = PulseConfig::default();
        c.normalization.etf_btc_flow.low = 5.0;
        c.normalization.etf_btc_flow.high = -5.0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(ref m)) if m.contains("etf_btc_flow")));

        let mut c = PulseConfig::default();
        c.normalization.etf_btc_flow.high = c.normalization.etf_btc_flow.low;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_negative_degeneracy_floors() {
        let mut c = PulseConfig::default();
        c.normalization.min_std = -1e-9;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(ref m)) if m.contains("min_std")));

        let mut c = PulseConfig::default();
        c.normalization.min_span = -1.0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(ref m)) if m.contains("min_span")));

        let mut c = PulseConfig::default();
        c.normalization.z_clamp = f64::INFINITY;
        assert!(c.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c: PulseConfig =
            serde_json::from_str(r#"{"wsps": {"alpha": 0.5}, "rules": {"cooldown_secs": 900}}"#)
                .unwrap();
        assert_eq!(c.wsps.alpha, 0.5);
        assert_eq!(c.wsps.thresholds.green, 67);
        assert_eq!(c.rules.cooldown_secs, 900);
        assert_eq!(c.rules.thresholds.flush_vix_min, 22.0);
        assert_eq!(c.poll_interval(), Duration::from_secs(60));
        c.validate().unwrap();
    }
}
