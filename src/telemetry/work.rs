//! Dispatch span helpers.
//!
//! Spans cover the claim path; the `work.id` field is declared empty and
//! filled in once a claim actually lands on an item.

use crate::model::State;
use tracing::Span;

/// Start a span for one worker's claim attempt.
pub fn start_claim_span(worker_id: &str) -> Span {
    tracing::info_span!(
        "work.claim",
        "work.worker" = worker_id,
        "work.id" = tracing::field::Empty,
    )
}

/// Record a state transition event scoped to the given span.
pub fn record_state_transition(span: &Span, from: State, to: State) {
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "state_transition");
    });
}
