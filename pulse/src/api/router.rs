use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::adapter::CircuitBreakerRegistry;
use crate::metrics::{CycleCounters, FetchCounters};
use crate::pulse_view::PulseView;

/// Shared by all handlers. Everything here is read-only from the API side.
pub struct AppState {
    pub view: PulseView,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub fetch_counters: FetchCounters,
    pub cycle_counters: CycleCounters,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/pulse/state", get(handlers::pulse_state))
        .route("/pulse/event", get(handlers::pulse_event))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
