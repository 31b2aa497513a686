//! Metric instrument factories.
//!
//! Instruments come from the `"leaseq"` meter on the globally-registered
//! `MeterProvider`; without one they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("leaseq")
}

/// Counter: engine operations.
/// Labels: `queue`, `operation` ("create" | "delete" | "enqueue" | "bulk" |
/// "next" | "next_empty" | "done" | "done_conflict" | "extend" | "expire").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: item moves between sequences.
/// Labels: `from`, `to`.
pub fn item_transitions() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.item.transitions")
        .with_description("Number of item sequence transitions")
        .build()
}

/// Counter: pending items returned to queued by the reaper.
/// Labels: `queue`.
pub fn reaper_reclaimed() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.reaper.reclaimed")
        .with_description("Items reclaimed after lease expiry")
        .build()
}

/// Counter: reaper failures that were logged and skipped.
/// Labels: `stage` ("list_queues" | "list_pending" | "lease" | "reclaim").
pub fn reaper_failures() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.reaper.failures")
        .with_description("Reaper failures skipped during a tick")
        .build()
}

/// Histogram: reaper tick duration in milliseconds.
pub fn reaper_tick_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("leaseq.reaper.tick_duration_ms")
        .with_description("Reaper tick duration in milliseconds")
        .with_unit("ms")
        .build()
}
