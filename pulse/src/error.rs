use thiserror::Error;

/// Startup configuration problems. Any of these aborts the process: a
/// partially configured scorer would publish meaningless numbers.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error("missing weight for factor {0}")]
    MissingWeight(String),

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid band thresholds: {0}")]
    InvalidThresholds(String),

    #[error("smoothing alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),

    #[error("invalid setting: {0}")]
    Invalid(String),
}
