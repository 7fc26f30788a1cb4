//! Dispatcher: hands one workable item to a requesting worker.
//!
//! Workers pull — each runs its own polling loop against `dispatch`, so no
//! broker or in-process shared state is needed. The dispatcher holds nothing
//! beyond configuration; ordering and mutual exclusion live in the claim
//! statement itself.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug};

use crate::db::Db;
use crate::error::Result;
use crate::model::{State, WorkItem};
use crate::telemetry::work::{record_state_transition, start_claim_span};

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Lease granted per claim. Choose it longer than the slowest expected
    /// report-generation run.
    pub lease_duration: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(300),
        }
    }
}

/// Thin wrapper over the atomic claim.
pub struct Dispatcher {
    db: Arc<Db>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(db: Arc<Db>, config: DispatchConfig) -> Self {
        Self { db, config }
    }

    /// Claim the next eligible item for `worker_id` under the configured
    /// lease duration. `None` means nothing is workable right now; the worker
    /// polls again later.
    pub async fn dispatch(&self, worker_id: &str) -> Result<Option<WorkItem>> {
        self.dispatch_with_lease(worker_id, self.config.lease_duration)
            .await
    }

    /// Claim with an explicit lease duration, for workers that know their
    /// task will run unusually long.
    pub async fn dispatch_with_lease(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<WorkItem>> {
        let span = start_claim_span(worker_id);

        async {
            let item = self.db.claim_next(worker_id, lease_duration).await?;

            match &item {
                Some(item) => {
                    let span = tracing::Span::current();
                    span.record("work.id", tracing::field::display(&item.id));
                    record_state_transition(&span, State::Queued, State::Leased);
                    debug!(
                        priority = %item.priority,
                        attempt = item.attempts,
                        "dispatched"
                    );
                }
                None => debug!("no eligible work"),
            }

            Ok(item)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lease_is_five_minutes() {
        assert_eq!(
            DispatchConfig::default().lease_duration,
            Duration::from_secs(300)
        );
    }
}
