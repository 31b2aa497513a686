//! Span helpers for the reaper and item transitions.

use tracing::Span;

/// Start a span covering one reaper tick.
///
/// `reaper.reclaimed` is declared empty and filled in via
/// [`record_reclaimed`] once the tick finishes.
pub fn start_tick_span(tick: u64) -> Span {
    tracing::info_span!(
        "reaper.tick",
        "reaper.tick" = tick,
        "reaper.reclaimed" = tracing::field::Empty,
    )
}

pub fn record_reclaimed(span: &Span, reclaimed: u64) {
    span.record("reaper.reclaimed", reclaimed);
}

/// Emit an item transition event scoped to the given span.
pub fn record_transition(span: &Span, queue: &str, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::debug!(queue = queue, from = from, to = to, "item_transition");
    });
}
