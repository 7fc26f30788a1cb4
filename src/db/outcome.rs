//! Outcome transitions: complete, fail-with-retry, fail-terminal.
//!
//! Both operations are conditional on `state = 'leased'`, which makes a late
//! report after a janitor reclaim a harmless no-op rather than an error.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{State, WorkId};
use crate::retry::RetryPolicy;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

use super::store::validate_transition;

/// What a `fail_item` call did to the row.
#[derive(Debug)]
pub enum FailDisposition {
    /// Attempts remain; the item went back to `Queued` under backoff.
    Requeued { next_eligible_at: DateTime<Utc> },
    /// Attempts exhausted; the item is terminally `Failed` and the owning
    /// report must be marked failed.
    Exhausted { report_id: Uuid },
    /// The item was not leased any more (reclaimed, reported, or gone).
    /// Duplicate-report race; nothing was changed.
    Stale,
}

impl super::Db {
    /// Mark a leased item complete: `Leased -> Complete`.
    ///
    /// Returns false when the item is no longer leased — a worker reporting
    /// after its lease expired and was reclaimed. That race is benign and
    /// never an error.
    pub async fn complete_item(&self, id: WorkId) -> Result<bool> {
        validate_transition(State::Leased, State::Complete)?;

        let now = Utc::now();
        let rows_affected = sqlx::query(
            "UPDATE work_items SET
                 state = 'complete', lease_holder = NULL, lease_expires_at = NULL,
                 updated_at = $1, resolved_at = $1
             WHERE id = $2 AND state = 'leased'",
        )
        .bind(now)
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected > 0 {
            metrics::work_state_transitions().add(
                1,
                &[KeyValue::new("from", "leased"), KeyValue::new("to", "complete")],
            );
        }

        Ok(rows_affected > 0)
    }

    /// Record a failed attempt and decide retry-vs-terminal.
    ///
    /// The stored row is the authority: attempts and max_attempts are read
    /// under a row lock in the same transaction as the transition, so a call
    /// arriving long after the claim still branches on current state.
    /// `backoff` turns the post-claim attempt count into the retry delay.
    pub async fn fail_item(
        &self,
        id: WorkId,
        error: &str,
        backoff: &RetryPolicy,
    ) -> Result<FailDisposition> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i32, i32, Uuid)> = sqlx::query_as(
            "SELECT attempts, max_attempts, report_id FROM work_items
             WHERE id = $1 AND state = 'leased'
             FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((attempts, max_attempts, report_id)) = row else {
            return Ok(FailDisposition::Stale);
        };

        let now = Utc::now();

        if attempts >= max_attempts {
            validate_transition(State::Leased, State::Failed)?;
            sqlx::query(
                "UPDATE work_items SET
                     state = 'failed', last_error = $1, error_count = error_count + 1,
                     lease_holder = NULL, lease_expires_at = NULL,
                     updated_at = $2, resolved_at = $2
                 WHERE id = $3",
            )
            .bind(error)
            .bind(now)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            metrics::work_state_transitions().add(
                1,
                &[KeyValue::new("from", "leased"), KeyValue::new("to", "failed")],
            );

            Ok(FailDisposition::Exhausted { report_id })
        } else {
            validate_transition(State::Leased, State::Queued)?;
            let delay = backoff.delay_for_attempt(attempts as u32);
            // Zero delay means eligible immediately — leave the column null
            let next_eligible_at = (!delay.is_zero())
                .then(|| now + chrono::Duration::milliseconds(delay.as_millis() as i64));

            sqlx::query(
                "UPDATE work_items SET
                     state = 'queued', last_error = $1, error_count = error_count + 1,
                     next_eligible_at = $2,
                     lease_holder = NULL, lease_expires_at = NULL, updated_at = $3
                 WHERE id = $4",
            )
            .bind(error)
            .bind(next_eligible_at)
            .bind(now)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            metrics::work_state_transitions().add(
                1,
                &[KeyValue::new("from", "leased"), KeyValue::new("to", "queued")],
            );

            Ok(FailDisposition::Requeued {
                next_eligible_at: next_eligible_at.unwrap_or(now),
            })
        }
    }

    /// Write the terminal-failure cascade onto the owning report.
    ///
    /// The only cross-entity write in the queue; the report's own lifecycle
    /// is governed upstream.
    pub async fn mark_report_failed(&self, report_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE reports SET status = 'failed', failure_reason = $1, updated_at = $2
             WHERE id = $3",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(report_id)
        .execute(&self.pool)
        .await?;

        metrics::report_cascades().add(1, &[]);
        Ok(())
    }
}
