//! Core data model.
//!
//! A work item is one unit of dispatchable report-generation work. It has
//! identity (item, report, parcel, requester), a priority, lease metadata,
//! and a lifecycle state that only ever moves forward into a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of report-generation work tracked by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier.
    pub id: WorkId,

    /// The report this item produces. Deleting the report deletes the item.
    pub report_id: Uuid,

    /// The parcel the report analyzes.
    pub parcel_id: Uuid,

    /// The user who requested the report.
    pub requested_by: Uuid,

    /// Dispatch priority. Urgent items are claimed before lower ones.
    pub priority: Priority,

    /// Current lifecycle state.
    pub state: State,

    /// Insertion time; the tie-breaker within a priority level.
    pub queued_at: DateTime<Utc>,

    /// When a retry backoff elapses. None means eligible immediately.
    pub next_eligible_at: Option<DateTime<Utc>>,

    /// Worker currently holding the lease, if any.
    pub lease_holder: Option<String>,

    /// When the current lease expires and the janitor may reclaim.
    pub lease_expires_at: Option<DateTime<Utc>>,

    /// Number of leases taken. Incremented at claim time, never on reclaim.
    pub attempts: u32,

    /// Attempt bound; reaching it makes the next failure terminal.
    pub max_attempts: u32,

    /// Error text from the most recent reported failure.
    pub last_error: Option<String>,

    /// Number of reported failures (janitor reclaims do not count).
    pub error_count: u32,

    pub updated_at: DateTime<Utc>,

    /// Set when the item enters a terminal state.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Whether the lease on this item has already expired.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lease_expires_at, Some(exp) if exp < now)
    }
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Dispatch priority. Lower rank = claimed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Ordinal rank used as the primary claim-ordering key (1 = most urgent).
    pub fn rank(self) -> i16 {
        match self {
            Priority::Urgent => 1,
            Priority::High => 2,
            Priority::Normal => 3,
            Priority::Low => 4,
        }
    }

    pub fn from_rank(rank: i16) -> Option<Self> {
        match rank {
            1 => Some(Priority::Urgent),
            2 => Some(Priority::High),
            3 => Some(Priority::Normal),
            4 => Some(Priority::Low),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(crate::error::Error::Other(format!("unknown priority: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Waiting for a worker; may be under a retry backoff.
    Queued,
    /// One worker holds an exclusive, time-bounded lease.
    Leased,
    /// Done successfully. Terminal.
    Complete,
    /// Attempts exhausted. Terminal; cascades to the report.
    Failed,
    /// Withdrawn before any worker took it. Terminal.
    Cancelled,
}

impl State {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Queued, Leased)
                | (Queued, Cancelled)
                | (Leased, Complete)
                | (Leased, Queued)   // retry with backoff, or janitor reclaim
                | (Leased, Failed) // exhausted attempts
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Complete | State::Failed | State::Cancelled)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Queued => "queued",
            State::Leased => "leased",
            State::Complete => "complete",
            State::Failed => "failed",
            State::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for State {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(State::Queued),
            "leased" => Ok(State::Leased),
            "complete" => Ok(State::Complete),
            "failed" => Ok(State::Failed),
            "cancelled" => Ok(State::Cancelled),
            _ => Err(crate::error::Error::Other(format!("unknown state: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for enqueuing new work. The queue's public API for producers.
pub struct NewWorkItem {
    pub(crate) report_id: Uuid,
    pub(crate) parcel_id: Uuid,
    pub(crate) requested_by: Uuid,
    pub(crate) priority: Priority,
    pub(crate) max_attempts: Option<u32>,
}

impl NewWorkItem {
    pub fn new(report_id: Uuid, parcel_id: Uuid, requested_by: Uuid) -> Self {
        Self {
            report_id,
            parcel_id,
            requested_by,
            priority: Priority::Normal,
            max_attempts: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_rank_orders_urgent_first() {
        assert!(Priority::Urgent.rank() < Priority::High.rank());
        assert!(Priority::High.rank() < Priority::Normal.rank());
        assert!(Priority::Normal.rank() < Priority::Low.rank());
    }

    #[test]
    fn priority_rank_round_trips() {
        for p in [
            Priority::Urgent,
            Priority::High,
            Priority::Normal,
            Priority::Low,
        ] {
            assert_eq!(Priority::from_rank(p.rank()), Some(p));
        }
        assert_eq!(Priority::from_rank(0), None);
        assert_eq!(Priority::from_rank(5), None);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use State::*;
        for terminal in [Complete, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for to in [Queued, Leased, Complete, Failed, Cancelled] {
                assert!(
                    !terminal.can_transition_to(to),
                    "{terminal} must not transition to {to}"
                );
            }
        }
    }

    #[test]
    fn queued_transitions() {
        assert!(State::Queued.can_transition_to(State::Leased));
        assert!(State::Queued.can_transition_to(State::Cancelled));
        assert!(!State::Queued.can_transition_to(State::Complete));
        assert!(!State::Queued.can_transition_to(State::Failed));
    }

    #[test]
    fn leased_transitions() {
        assert!(State::Leased.can_transition_to(State::Complete));
        assert!(State::Leased.can_transition_to(State::Failed));
        assert!(State::Leased.can_transition_to(State::Queued));
        assert!(!State::Leased.can_transition_to(State::Cancelled));
    }

    #[test]
    fn lease_expiry_check() {
        let now = Utc::now();
        let item = WorkItem {
            id: WorkId::new(),
            report_id: Uuid::new_v4(),
            parcel_id: Uuid::new_v4(),
            requested_by: Uuid::new_v4(),
            priority: Priority::Normal,
            state: State::Leased,
            queued_at: now,
            next_eligible_at: None,
            lease_holder: Some("worker-1".to_string()),
            lease_expires_at: Some(now - chrono::Duration::seconds(1)),
            attempts: 1,
            max_attempts: 3,
            last_error: None,
            error_count: 0,
            updated_at: now,
            resolved_at: None,
        };
        assert!(item.lease_expired(now));
    }
}
