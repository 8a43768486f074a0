use serde::Serialize;

use crate::feeds::AdapterId;
use crate::rules::EventKind;

/// How the last cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Emitted { kind: EventKind },
    SkippedStale { feeds: Vec<AdapterId> },
    NoSignal { cooldown_blocked: Vec<EventKind> },
    /// WSPS state could not be read or written; rules were not run.
    ScoringUnavailable,
    /// Cooldown state could not be read or claimed.
    RulesUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStatus {
    pub trace_id: String,
    pub ts_ms: u64,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
    pub degraded: bool,
    pub stale_feeds: Vec<AdapterId>,
}
