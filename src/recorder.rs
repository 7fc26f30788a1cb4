//! Outcome recorder: applies the terminal-or-retry decision for a worker's
//! attempt and carries the one cross-entity side effect — marking the owning
//! report failed once attempts are exhausted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Db;
use crate::db::outcome::FailDisposition;
use crate::error::Result;
use crate::model::WorkId;
use crate::retry::RetryPolicy;

/// Where terminal failures land. Injected so the queue is testable without
/// the report table and so the cascade is visible at the seam instead of
/// hidden in a trigger.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report_failed(&self, report_id: Uuid, error: &str) -> Result<()>;
}

/// Default sink: writes failure status onto the reports table.
pub struct PgReportSink {
    db: Arc<Db>,
}

impl PgReportSink {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReportSink for PgReportSink {
    async fn report_failed(&self, report_id: Uuid, error: &str) -> Result<()> {
        self.db.mark_report_failed(report_id, error).await
    }
}

/// Records worker outcomes against the store.
pub struct OutcomeRecorder {
    db: Arc<Db>,
    sink: Arc<dyn ReportSink>,
    backoff: RetryPolicy,
}

impl OutcomeRecorder {
    pub fn new(db: Arc<Db>, sink: Arc<dyn ReportSink>, backoff: RetryPolicy) -> Self {
        Self { db, sink, backoff }
    }

    /// Recorder with the Postgres sink and the given backoff policy.
    pub fn with_pg_sink(db: Arc<Db>, backoff: RetryPolicy) -> Self {
        let sink = Arc::new(PgReportSink::new(Arc::clone(&db)));
        Self::new(db, sink, backoff)
    }

    /// Report success. False means the item had already moved on (its lease
    /// expired and was reclaimed, or it was reported twice) — a benign no-op.
    pub async fn complete(&self, id: WorkId) -> Result<bool> {
        let applied = self.db.complete_item(id).await?;
        if applied {
            info!(id = %id, "work item complete");
        } else {
            warn!(id = %id, "stale completion report ignored");
        }
        Ok(applied)
    }

    /// Report failure using the configured backoff policy.
    ///
    /// Requeues under backoff while attempts remain; otherwise the item goes
    /// terminally `Failed` and the owning report is marked failed with the
    /// same error text. Returns false on the stale-report race.
    pub async fn fail(&self, id: WorkId, error: &str) -> Result<bool> {
        self.fail_with(id, error, &self.backoff).await
    }

    /// Report failure with an explicit one-off delay instead of the policy.
    pub async fn fail_with_delay(&self, id: WorkId, error: &str, delay: Duration) -> Result<bool> {
        self.fail_with(id, error, &RetryPolicy::fixed(delay)).await
    }

    async fn fail_with(&self, id: WorkId, error: &str, backoff: &RetryPolicy) -> Result<bool> {
        match self.db.fail_item(id, error, backoff).await? {
            FailDisposition::Requeued { next_eligible_at } => {
                info!(id = %id, %next_eligible_at, error, "attempt failed, requeued");
                Ok(true)
            }
            FailDisposition::Exhausted { report_id } => {
                warn!(id = %id, %report_id, error, "attempts exhausted, work item failed");
                // One-way side effect; the item transition is already
                // committed, so a sink error must not fail the report call.
                if let Err(e) = self.sink.report_failed(report_id, error).await {
                    warn!(%report_id, "report failure cascade did not apply: {e}");
                }
                Ok(true)
            }
            FailDisposition::Stale => {
                warn!(id = %id, "stale failure report ignored");
                Ok(false)
            }
        }
    }
}
