//! Lease operations: claim, renew, release, reclaim.
//!
//! The only code allowed to move items into or out of `Leased`. Every
//! operation is a single conditional statement against the row, so two
//! workers can never hold the same item: selection uses
//! `FOR UPDATE SKIP LOCKED`, and renew/release are keyed on the holder.

use std::time::Duration;

use crate::error::Result;
use crate::model::{State, WorkId, WorkItem};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use tracing::warn;

use super::store::{WORK_ITEM_COLUMNS, WorkItemRow, validate_transition};

impl super::Db {
    /// Atomically claim the next eligible item for `worker_id`.
    ///
    /// Selects the highest-priority, oldest queued item whose backoff (if
    /// any) has elapsed, marks it leased, and increments its attempt count.
    /// The returned item carries the post-increment count. Contended rows are
    /// skipped, not waited on; `None` means nothing is eligible right now and
    /// is not an error — poll again later.
    pub async fn claim_next(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<WorkItem>> {
        validate_transition(State::Queued, State::Leased)?;

        let now = chrono::Utc::now();
        let expires_at = now + chrono::Duration::milliseconds(lease_duration.as_millis() as i64);

        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "UPDATE work_items SET
                 state = 'leased',
                 lease_holder = $1,
                 lease_expires_at = $2,
                 attempts = attempts + 1,
                 next_eligible_at = NULL,
                 updated_at = $3
             WHERE id = (
                 SELECT id FROM work_items
                 WHERE state = 'queued'
                   AND (next_eligible_at IS NULL OR next_eligible_at <= $3)
                 ORDER BY priority ASC, queued_at ASC, id ASC
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING {WORK_ITEM_COLUMNS}"
        ))
        .bind(worker_id)
        .bind(expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        metrics::lease_operations().add(
            1,
            &[KeyValue::new(
                "operation",
                if row.is_some() { "claim" } else { "claim_empty" },
            )],
        );

        match row {
            Some(row) => {
                metrics::work_state_transitions().add(
                    1,
                    &[KeyValue::new("from", "queued"), KeyValue::new("to", "leased")],
                );
                Ok(Some(row.try_into_work_item()?))
            }
            None => Ok(None),
        }
    }

    /// Extend a live lease held by `worker_id`.
    ///
    /// True if the caller still held the lease; false (no-op) if the item was
    /// reclaimed, reported, or taken over in the meantime.
    pub async fn renew_lease(
        &self,
        id: WorkId,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<bool> {
        let now = chrono::Utc::now();
        let expires_at = now + chrono::Duration::milliseconds(lease_duration.as_millis() as i64);

        let rows_affected = sqlx::query(
            "UPDATE work_items SET lease_expires_at = $1, updated_at = $2
             WHERE id = $3 AND state = 'leased' AND lease_holder = $4",
        )
        .bind(expires_at)
        .bind(now)
        .bind(id.0)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        metrics::lease_operations().add(1, &[KeyValue::new("operation", "renew")]);

        Ok(rows_affected > 0)
    }

    /// Voluntarily give a lease back before doing the work, e.g. on worker
    /// shutdown. The item returns to `Queued` immediately; the attempt taken
    /// at claim time is kept.
    pub async fn release(&self, id: WorkId, worker_id: &str) -> Result<bool> {
        validate_transition(State::Leased, State::Queued)?;

        let now = chrono::Utc::now();
        let rows_affected = sqlx::query(
            "UPDATE work_items SET
                 state = 'queued', lease_holder = NULL, lease_expires_at = NULL, updated_at = $1
             WHERE id = $2 AND state = 'leased' AND lease_holder = $3",
        )
        .bind(now)
        .bind(id.0)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected > 0 {
            metrics::lease_operations().add(1, &[KeyValue::new("operation", "release")]);
            metrics::work_state_transitions().add(
                1,
                &[KeyValue::new("from", "leased"), KeyValue::new("to", "queued")],
            );
        }

        Ok(rows_affected > 0)
    }

    /// Requeue every item whose lease expired without an outcome report.
    ///
    /// Attempts are not incremented — the claim already counted this attempt,
    /// so repeated crash/reclaim cycles still run into `max_attempts` at the
    /// next claim's failure. Safe to run concurrently with claims and with
    /// itself; contended rows are skipped and picked up on the next sweep.
    pub async fn reclaim_expired(&self) -> Result<u64> {
        let now = chrono::Utc::now();

        let reclaimed: Vec<(uuid::Uuid, Option<String>)> = sqlx::query_as(
            "WITH expired AS (
                 SELECT id, lease_holder FROM work_items
                 WHERE state = 'leased' AND lease_expires_at < $1
                 FOR UPDATE SKIP LOCKED
             )
             UPDATE work_items w SET
                 state = 'queued', lease_holder = NULL, lease_expires_at = NULL, updated_at = $1
             FROM expired e
             WHERE w.id = e.id
             RETURNING e.id, e.lease_holder",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        for (id, holder) in &reclaimed {
            warn!(
                id = %id,
                holder = holder.as_deref().unwrap_or("-"),
                "lease expired without outcome, requeued"
            );
        }

        let count = reclaimed.len() as u64;
        if count > 0 {
            metrics::items_reclaimed().add(count, &[]);
        }

        Ok(count)
    }
}
