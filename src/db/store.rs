//! Work item store: enqueue, lookup, listing, cancellation.
//!
//! All other mutation (claim, renew, release, complete, fail, reclaim) lives
//! in the lease and outcome submodules so the state-machine invariants stay
//! in one place per transition.

use crate::error::{Error, Result};
use crate::model::{NewWorkItem, Priority, State, WorkId, WorkItem};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use uuid::Uuid;

/// All work_items columns, in the order every query selects them.
pub(crate) const WORK_ITEM_COLUMNS: &str = "id, report_id, parcel_id, requested_by, priority, \
     state, queued_at, next_eligible_at, lease_holder, lease_expires_at, \
     attempts, max_attempts, last_error, error_count, updated_at, resolved_at";

/// Validate a state transition, returning an error if disallowed.
pub(crate) fn validate_transition(from: State, to: State) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

/// Per-state item counts, for the CLI and observability.
#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    pub queued: i64,
    pub leased: i64,
    pub complete: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl super::Db {
    /// Insert a report row so work can reference it.
    ///
    /// The report entity is owned upstream; this exists so the CLI and tests
    /// can exercise the enqueue boundary end to end.
    pub async fn create_report(&self, parcel_id: Uuid, requested_by: Uuid) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO reports (id, parcel_id, requested_by, status) VALUES ($1, $2, $3, 'pending')",
        )
        .bind(id)
        .bind(parcel_id)
        .bind(requested_by)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Enqueue a new work item in `Queued` state with zero attempts.
    ///
    /// No dedup is enforced here: two enqueues for the same report yield two
    /// in-flight items. Callers that need idempotent enqueue must check for
    /// an active item first.
    pub async fn enqueue(&self, new: NewWorkItem) -> Result<WorkItem> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            "INSERT INTO work_items (id, report_id, parcel_id, requested_by, priority, state, queued_at, max_attempts, updated_at)
             VALUES ($1, $2, $3, $4, $5, 'queued', $6, $7, $6)",
        )
        .bind(id)
        .bind(new.report_id)
        .bind(new.parcel_id)
        .bind(new.requested_by)
        .bind(new.priority.rank())
        .bind(now)
        .bind(new.max_attempts.unwrap_or(3) as i32)
        .execute(&self.pool)
        .await?;

        metrics::items_enqueued().add(
            1,
            &[KeyValue::new("priority", new.priority.to_string())],
        );

        self.get_work_item(WorkId(id)).await
    }

    /// Get a work item by ID.
    pub async fn get_work_item(&self, id: WorkId) -> Result<WorkItem> {
        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("work item {id}")))?
            .try_into_work_item()
    }

    /// List work items, optionally filtered by state, newest first.
    pub async fn list_work_items(
        &self,
        state: Option<State>,
        limit: i64,
    ) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = match state {
            Some(state) => {
                sqlx::query_as(&format!(
                    "SELECT {WORK_ITEM_COLUMNS} FROM work_items
                     WHERE state = $1 ORDER BY queued_at DESC LIMIT $2"
                ))
                .bind(state.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {WORK_ITEM_COLUMNS} FROM work_items
                     ORDER BY queued_at DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|r| r.try_into_work_item()).collect()
    }

    /// Cancel a queued item: `Queued -> Cancelled`.
    ///
    /// Cancellation of a leased item is advisory only — the worker owns it
    /// until its lease resolves, so this affects zero rows and returns false.
    /// Callers may retry once the lease has been reported or reclaimed.
    pub async fn cancel(&self, id: WorkId) -> Result<bool> {
        validate_transition(State::Queued, State::Cancelled)?;

        let now = chrono::Utc::now();
        let rows_affected = sqlx::query(
            "UPDATE work_items SET state = 'cancelled', updated_at = $1, resolved_at = $1
             WHERE id = $2 AND state = 'queued'",
        )
        .bind(now)
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected > 0 {
            metrics::work_state_transitions().add(
                1,
                &[KeyValue::new("from", "queued"), KeyValue::new("to", "cancelled")],
            );
        }

        Ok(rows_affected > 0)
    }

    /// Count items per state.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM work_items GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = QueueStats::default();
        for (state, count) in rows {
            match state.parse::<State>()? {
                State::Queued => stats.queued = count,
                State::Leased => stats.leased = count,
                State::Complete => stats.complete = count,
                State::Failed => stats.failed = count,
                State::Cancelled => stats.cancelled = count,
            }
        }
        Ok(stats)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
pub(crate) struct WorkItemRow {
    id: Uuid,
    report_id: Uuid,
    parcel_id: Uuid,
    requested_by: Uuid,
    priority: i16,
    state: String,
    queued_at: chrono::DateTime<chrono::Utc>,
    next_eligible_at: Option<chrono::DateTime<chrono::Utc>>,
    lease_holder: Option<String>,
    lease_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    error_count: i32,
    updated_at: chrono::DateTime<chrono::Utc>,
    resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl WorkItemRow {
    pub(crate) fn try_into_work_item(self) -> Result<WorkItem> {
        Ok(WorkItem {
            id: WorkId(self.id),
            report_id: self.report_id,
            parcel_id: self.parcel_id,
            requested_by: self.requested_by,
            priority: Priority::from_rank(self.priority)
                .ok_or_else(|| Error::Other(format!("unknown priority rank: {}", self.priority)))?,
            state: self.state.parse()?,
            queued_at: self.queued_at,
            next_eligible_at: self.next_eligible_at,
            lease_holder: self.lease_holder,
            lease_expires_at: self.lease_expires_at,
            attempts: self.attempts as u32,
            max_attempts: self.max_attempts as u32,
            last_error: self.last_error,
            error_count: self.error_count as u32,
            updated_at: self.updated_at,
            resolved_at: self.resolved_at,
        })
    }
}
