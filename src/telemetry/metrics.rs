//! Metric instrument factories for parcelq-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"parcelq-rs"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for parcelq-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("parcelq-rs")
}

/// Counter: work items enqueued.
/// Labels: `priority`.
pub fn items_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("parcelq.items.enqueued")
        .with_description("Number of work items enqueued")
        .build()
}

/// Counter: lease operations (claim, claim_empty, renew, release).
/// Labels: `operation`.
pub fn lease_operations() -> Counter<u64> {
    meter()
        .u64_counter("parcelq.lease.operations")
        .with_description("Number of lease operations")
        .build()
}

/// Counter: work item state transitions.
/// Labels: `from`, `to`.
pub fn work_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("parcelq.items.state_transitions")
        .with_description("Number of work item state transitions")
        .build()
}

/// Counter: expired leases reclaimed by the janitor.
pub fn items_reclaimed() -> Counter<u64> {
    meter()
        .u64_counter("parcelq.items.reclaimed")
        .with_description("Number of expired leases reclaimed")
        .build()
}

/// Counter: terminal failures cascaded onto the owning report.
pub fn report_cascades() -> Counter<u64> {
    meter()
        .u64_counter("parcelq.reports.failure_cascades")
        .with_description("Number of terminal failures written to reports")
        .build()
}
