// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine error taxonomy.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::interval::DriverId;
use crate::status::DutyStatus;
use crate::store::StoreError;
use crate::violation::ViolationId;

/// Errors returned by engine operations.
///
/// Every failure is surfaced to the caller; nothing is swallowed. Use
/// [`HosError::is_user_correctable`] and [`HosError::is_retryable`] to decide
/// how to present or retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HosError {
    /// Requested status is not reachable from the current one.
    #[error("[HOS_INVALID_TRANSITION] {from} -> {to} is not a permitted duty-status change")]
    InvalidTransition {
        /// Status of the currently open interval.
        from: DutyStatus,
        /// Requested status.
        to: DutyStatus,
    },
    /// Odometer reading went backwards.
    #[error("[HOS_ODOMETER_REGRESSION] odometer {requested} is below last reading {last}")]
    OdometerRegression {
        /// Most recent interval's starting odometer.
        last: u64,
        /// Reading supplied with the change.
        requested: u64,
    },
    /// Status change timestamp would reorder or empty the timeline.
    #[error("[HOS_NON_MONOTONIC_TIMESTAMP] change at {requested} does not follow {not_before}")]
    NonMonotonicTimestamp {
        /// Open interval's start, or the closed latest interval's end.
        not_before: DateTime<Utc>,
        /// Timestamp supplied with the change.
        requested: DateTime<Utc>,
    },
    /// Driver has no active vehicle assignment.
    #[error("[HOS_NO_ACTIVE_ASSIGNMENT] driver {0} has no active vehicle assignment")]
    NoActiveAssignment(DriverId),
    /// Window end precedes window start.
    #[error("[HOS_INVALID_WINDOW] window end {end} precedes start {start}")]
    InvalidWindow {
        /// Window start.
        start: DateTime<Utc>,
        /// Window end.
        end: DateTime<Utc>,
    },
    /// Storage could not complete the operation; retry with backoff.
    #[error("[HOS_STORAGE_UNAVAILABLE] {0}")]
    StorageUnavailable(String),
    /// Violation does not exist.
    #[error("[HOS_NOT_FOUND] violation {0} not found")]
    NotFound(ViolationId),
    /// Violation was already resolved.
    #[error("[HOS_ALREADY_RESOLVED] violation {0} is already resolved")]
    AlreadyResolved(ViolationId),
}

impl HosError {
    /// The driver can fix the request and resubmit.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. }
                | Self::OdometerRegression { .. }
                | Self::NonMonotonicTimestamp { .. }
        )
    }

    /// The caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<StoreError> for HosError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::AlreadyResolved(id) => Self::AlreadyResolved(id),
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            StoreError::Conflict(msg) => {
                Self::StorageUnavailable(format!("commit conflict: {msg}"))
            }
        }
    }
}
