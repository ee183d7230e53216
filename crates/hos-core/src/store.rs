// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Storage ports for the engine.
//!
//! The engine never talks to a database client directly. It depends on the
//! narrow [`TimelineStore`] port (intervals + violations) and the external
//! [`AssignmentPort`]. [`crate::memory`] provides in-memory implementations.
//!
//! # Atomicity
//!
//! [`TimelineStore::commit_transition`] is the only interval mutation. It must
//! close the open interval and append the next one as a single unit: readers
//! observe either the state before or the state after, never a half-closed
//! timeline. A SQL-backed implementation gets this from a transaction plus a
//! uniqueness constraint on "open interval per driver".

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::interval::{DriverId, DutyInterval, IntervalId};
use crate::violation::{Violation, ViolationDraft, ViolationId};

/// Errors reported by storage implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable, timed out, or poisoned.
    #[error("[STORE_UNAVAILABLE] {0}")]
    Unavailable(String),
    /// The commit's expectation about the open interval no longer holds.
    #[error("[STORE_CONFLICT] {0}")]
    Conflict(String),
    /// Violation id not present.
    #[error("[STORE_NOT_FOUND] violation {0}")]
    NotFound(ViolationId),
    /// Violation already resolved.
    #[error("[STORE_ALREADY_RESOLVED] violation {0}")]
    AlreadyResolved(ViolationId),
}

/// Persisted timeline and violation state.
pub trait TimelineStore: Send + Sync {
    /// Up to `limit` most recent intervals for `driver`, in chronological order.
    fn latest_intervals(
        &self,
        driver: &DriverId,
        limit: usize,
    ) -> Result<Vec<DutyInterval>, StoreError>;

    /// The driver's open interval, if any.
    fn open_interval(&self, driver: &DriverId) -> Result<Option<DutyInterval>, StoreError>;

    /// Intervals with `start <= to` and (`end > from` or open), chronological.
    fn intervals_overlapping(
        &self,
        driver: &DriverId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DutyInterval>, StoreError>;

    /// Atomically close the open interval at `next.start` and append `next`.
    ///
    /// `expected_open` is the id of the open interval the caller validated
    /// against (`None` if the caller saw no open interval). If the store's
    /// current open interval differs, nothing is written and
    /// [`StoreError::Conflict`] is returned.
    fn commit_transition(
        &self,
        expected_open: Option<IntervalId>,
        next: DutyInterval,
    ) -> Result<DutyInterval, StoreError>;

    /// Every driver with at least one interval, sorted.
    fn drivers(&self) -> Result<Vec<DriverId>, StoreError>;

    /// Persist a new unresolved violation.
    fn insert_violation(&self, draft: ViolationDraft) -> Result<Violation, StoreError>;

    /// Persist a new unresolved violation unless one of the same kind is
    /// already unresolved for the driver. The check and the insert are atomic.
    fn insert_violation_unless_open(
        &self,
        draft: ViolationDraft,
    ) -> Result<Option<Violation>, StoreError>;

    /// Look up a violation.
    fn violation(&self, id: ViolationId) -> Result<Violation, StoreError>;

    /// Every violation for `driver`, ordered by id.
    fn violations(&self, driver: &DriverId) -> Result<Vec<Violation>, StoreError>;

    /// Mark a violation resolved.
    fn resolve_violation(
        &self,
        id: ViolationId,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Violation, StoreError>;
}

/// External vehicle-assignment collaborator.
pub trait AssignmentPort: Send + Sync {
    /// Whether `driver` currently has an active vehicle assignment.
    fn has_active_assignment(&self, driver: &DriverId) -> Result<bool, StoreError>;
}
