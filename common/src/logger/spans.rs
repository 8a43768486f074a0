use std::time::Duration;

use tracing::{Span, field};

use super::TraceId;

/// Root span for one polling cycle.
pub fn cycle_span(trace_id: &TraceId, now_ms: u64) -> Span {
    tracing::info_span!(
        "pulse_cycle",
        trace_id = %trace_id.as_str(),
        now_ms,
        adapter = field::Empty,
        event_kind = field::Empty
    )
}

/// Child span; inherits the trace id of the enclosing cycle.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("child", name = %name, adapter = field::Empty)
}

/// Records the adapter id on the current span, if it declared the field.
pub fn annotate_adapter(adapter: &str) {
    Span::current().record("adapter", field::display(adapter));
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
