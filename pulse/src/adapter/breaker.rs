//! Per-adapter circuit breakers.
//!
//! State machine:
//! - `Closed`: requests pass; failures are counted.
//! - `Open`: requests are blocked until `next_retry_at_ms`.
//! - `HalfOpen`: exactly one trial request is admitted; its success closes
//!   the circuit, its failure reopens it with a longer backoff.
//!
//! Adapters never share state: a failing feed cannot block another one.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::feeds::AdapterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub state: BreakerState,
    pub opened_at_ms: Option<u64>,
    pub next_retry_at_ms: Option<u64>,

    /// Openings since the last success; drives exponential backoff.
    #[serde(skip)]
    trips: u32,
    #[serde(skip)]
    trial_in_flight: bool,
}

/// Exponential backoff: `base_ms * 2^(trips - 1)`, capped at `max_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 30_000,
            max_ms: 600_000,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_ms(&self, trips: u32) -> u64 {
        let shift = trips.saturating_sub(1).min(32);
        self.base_ms.saturating_mul(1u64 << shift).min(self.max_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    pub backoff: BackoffPolicy,
    /// Per-adapter backoff overrides.
    pub overrides: HashMap<AdapterId, BackoffPolicy>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            backoff: BackoffPolicy::default(),
            overrides: HashMap::new(),
        }
    }
}

pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    circuits: Mutex<HashMap<AdapterId, CircuitState>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Pass/block decision. Must be called before any network I/O.
    ///
    /// An open circuit whose retry time has elapsed moves to `HalfOpen` and
    /// admits this single call as the trial request.
    pub fn can_pass(&self, adapter: AdapterId, now_ms: u64) -> bool {
        let mut circuits = self.circuits.lock();
        let c = circuits.entry(adapter).or_default();

        match c.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let retry_at = c.next_retry_at_ms.unwrap_or(0);
                if now_ms < retry_at {
                    return false;
                }
                c.state = BreakerState::HalfOpen;
                c.trial_in_flight = true;
                info!(%adapter, now_ms, "circuit half-open; admitting trial request");
                true
            }
            BreakerState::HalfOpen => {
                if c.trial_in_flight {
                    false
                } else {
                    c.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Backoff that the next opening of `adapter` would use.
    pub fn next_backoff_ms(&self, adapter: AdapterId) -> u64 {
        let trips = self
            .circuits
            .lock()
            .get(&adapter)
            .map(|c| c.trips)
            .unwrap_or(0);
        self.policy_for(adapter).delay_ms(trips + 1)
    }

    /// Records a failed request and returns the resulting state.
    pub fn report_failure(&self, adapter: AdapterId, backoff_ms: u64, now_ms: u64) -> BreakerState {
        let mut circuits = self.circuits.lock();
        let c = circuits.entry(adapter).or_default();

        c.consecutive_failures = c.consecutive_failures.saturating_add(1);

        let should_open = match c.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => c.consecutive_failures >= self.config.failure_threshold,
            BreakerState::Open => false,
        };

        if should_open {
            c.state = BreakerState::Open;
            c.trips = c.trips.saturating_add(1);
            c.trial_in_flight = false;
            c.opened_at_ms = Some(now_ms);
            c.next_retry_at_ms = Some(now_ms.saturating_add(backoff_ms));

            warn!(
                %adapter,
                failures = c.consecutive_failures,
                trips = c.trips,
                backoff_ms,
                "circuit opened"
            );
        } else {
            debug!(%adapter, failures = c.consecutive_failures, "failure recorded");
        }

        c.state
    }

    /// Any success heals the circuit, including from `HalfOpen`.
    pub fn report_success(&self, adapter: AdapterId) {
        let mut circuits = self.circuits.lock();
        let c = circuits.entry(adapter).or_default();

        if c.state != BreakerState::Closed {
            info!(%adapter, "circuit closed after success");
        }

        *c = CircuitState::default();
    }

    /// Current state as seen at `now_ms`. An open circuit past its retry time
    /// reports as `HalfOpen` even before a call has claimed the trial.
    pub fn snapshot(&self, adapter: AdapterId, now_ms: u64) -> CircuitState {
        let mut c = self
            .circuits
            .lock()
            .get(&adapter)
            .cloned()
            .unwrap_or_default();

        if c.state == BreakerState::Open && c.next_retry_at_ms.is_some_and(|t| now_ms >= t) {
            c.state = BreakerState::HalfOpen;
        }
        c
    }

    fn policy_for(&self, adapter: AdapterId) -> BackoffPolicy {
        self.config
            .overrides
            .get(&adapter)
            .copied()
            .unwrap_or(self.config.backoff)
    }
}
