use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;

use super::{ApiError, AppState};
use crate::adapter::CircuitState;
use crate::feeds::AdapterId;
use crate::metrics::{AdapterStats, CycleCounters};
use crate::pulse_view::CycleStatus;
use crate::rules::EmittedEvent;
use crate::wsps::WspsReading;

#[derive(Debug, Serialize)]
pub struct AdapterHealth {
    pub adapter: AdapterId,
    pub circuit: CircuitState,
    pub stats: AdapterStats,
}

#[derive(Debug, Serialize)]
pub struct CycleTotals {
    pub cycles: u64,
    pub stale_skips: u64,
    pub events_emitted: u64,
    pub cooldown_blocked: u64,
    pub no_signal: u64,
    pub store_errors: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, `degraded` (stale feeds last cycle) or `starting`.
    pub status: &'static str,
    pub degraded: bool,
    pub adapters: Vec<AdapterHealth>,
    pub last_cycle: Option<CycleStatus>,
    pub totals: CycleTotals,
}

/// GET /pulse/state
pub async fn pulse_state(State(state): State<Arc<AppState>>) -> Result<Json<WspsReading>, ApiError> {
    state
        .view
        .reading()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no reading published yet"))
}

/// GET /pulse/event
pub async fn pulse_event(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EmittedEvent>, ApiError> {
    state
        .view
        .last_event()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no event emitted yet"))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let now_ms = common::time::now_ms();
    let adapters = AdapterId::ALL
        .iter()
        .map(|&adapter| AdapterHealth {
            adapter,
            circuit: state.breakers.snapshot(adapter, now_ms),
            stats: state.fetch_counters.snapshot(adapter),
        })
        .collect();

    let last_cycle = state.view.last_status().await;
    let degraded = last_cycle.as_ref().is_some_and(|c| c.degraded);
    let status = match &last_cycle {
        None => "starting",
        Some(_) if degraded => "degraded",
        Some(_) => "ok",
    };

    let c = &state.cycle_counters;
    Json(HealthResponse {
        status,
        degraded,
        adapters,
        last_cycle,
        totals: CycleTotals {
            cycles: CycleCounters::read(&c.cycles),
            stale_skips: CycleCounters::read(&c.stale_skips),
            events_emitted: CycleCounters::read(&c.events_emitted),
            cooldown_blocked: CycleCounters::read(&c.cooldown_blocked),
            no_signal: CycleCounters::read(&c.no_signal),
            store_errors: CycleCounters::read(&c.store_errors),
        },
    })
}
