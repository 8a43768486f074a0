//! Auto-react rule evaluation: stale gate, ordered rules, cooldown-gated
//! emission of at most one event per cycle.

pub mod catalog;
pub mod cooldown;
pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub use catalog::{GUARDRAILS, RuleThresholds, default_rules};
pub use cooldown::{COOLDOWN_SECS, CooldownGate, cooldown_key};
pub use types::{CooldownRecord, EmittedEvent, Event, EventKind, Rule, RuleInputs, RuleMatch};

use crate::feeds::{AdapterId, FeedSnapshot};
use crate::state::StateStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub thresholds: RuleThresholds,
    pub cooldown_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            thresholds: RuleThresholds::default(),
            cooldown_secs: COOLDOWN_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleDecision {
    Emitted(EmittedEvent),
    /// A feed some rule depends on was stale; nothing was evaluated.
    SkippedStale(Vec<AdapterId>),
    /// Nothing fired. `cooldown_blocked` lists kinds that matched but were
    /// still cooling down.
    NoSignal { cooldown_blocked: Vec<EventKind> },
}

pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
    cooldowns: CooldownGate,
}

impl RuleEngine {
    pub fn new(config: &RulesConfig, store: Arc<dyn StateStore>) -> Self {
        Self::with_rules(
            default_rules(&config.thresholds),
            CooldownGate::new(store, config.cooldown_secs),
        )
    }

    pub fn with_rules(rules: Vec<Box<dyn Rule>>, cooldowns: CooldownGate) -> Self {
        Self { rules, cooldowns }
    }

    /// Union of feeds read by any rule.
    pub fn gated_feeds(&self) -> BTreeSet<AdapterId> {
        self.rules
            .iter()
            .flat_map(|r| r.feeds().iter().copied())
            .collect()
    }

    /// Stale feeds that any rule depends on.
    pub fn stale_inputs(&self, snapshot: &FeedSnapshot) -> Vec<AdapterId> {
        self.gated_feeds()
            .into_iter()
            .filter(|a| snapshot.is_stale(*a))
            .collect()
    }

    #[instrument(skip(self, snapshot, inputs), target = "rules")]
    pub async fn decide(
        &self,
        snapshot: &FeedSnapshot,
        inputs: &RuleInputs,
        now_ms: u64,
    ) -> anyhow::Result<RuleDecision> {
        let stale = self.stale_inputs(snapshot);
        if !stale.is_empty() {
            info!(?stale, "stale feeds; rule evaluation skipped");
            return Ok(RuleDecision::SkippedStale(stale));
        }

        let mut cooldown_blocked = Vec::new();

        for rule in &self.rules {
            let Some(m) = rule.evaluate(inputs) else {
                continue;
            };
            let kind = rule.kind();

            if let Some(until) = self.cooldowns.is_cooling(kind, now_ms).await? {
                debug!(%kind, until, "rule matched but cooling down");
                cooldown_blocked.push(kind);
                continue;
            }

            let Some(cooldown_expires_at_ms) = self.cooldowns.claim(kind, now_ms).await? else {
                cooldown_blocked.push(kind);
                continue;
            };

            let event = Event {
                id: Uuid::new_v4(),
                kind,
                rationale: m.rationale,
                sizing_note: m.sizing_note,
                guardrails: GUARDRAILS.iter().map(|g| g.to_string()).collect(),
                ts_ms: now_ms,
            };
            info!(%kind, id = %event.id, cooldown_expires_at_ms, "event emitted");

            return Ok(RuleDecision::Emitted(EmittedEvent {
                event,
                cooldown_expires_at_ms,
            }));
        }

        Ok(RuleDecision::NoSignal { cooldown_blocked })
    }
}
