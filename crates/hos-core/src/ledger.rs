// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Duty-status ledger: the only write path onto a driver's timeline.
//!
//! A status change is validated in a fixed order (assignment, odometer,
//! transition, timestamp) and then committed with a single
//! [`TimelineStore::commit_transition`] call. A rejected change writes nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HosError;
use crate::interval::{whole_seconds, DriverId, DutyInterval, GeoFix, IntervalId};
use crate::status::DutyStatus;
use crate::store::{AssignmentPort, TimelineStore};

/// A requested duty-status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Driver changing status.
    pub driver: DriverId,
    /// New status.
    pub status: DutyStatus,
    /// Free-form location description.
    #[serde(default)]
    pub location: String,
    /// Odometer reading at the change.
    pub odometer: u64,
    /// When the change took effect; defaults to the ledger clock.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Optional driver notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Optional position fix.
    #[serde(default)]
    pub geo: Option<GeoFix>,
}

impl StatusChange {
    /// Change with no location, notes, geo, or explicit timestamp.
    pub fn new(driver: impl Into<DriverId>, status: DutyStatus, odometer: u64) -> Self {
        Self {
            driver: driver.into(),
            status,
            location: String::new(),
            odometer,
            timestamp: None,
            notes: None,
            geo: None,
        }
    }

    /// Set the effective timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the location description.
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

/// Appends validated status changes to a [`TimelineStore`].
pub struct Ledger<'a, S: ?Sized, A: ?Sized> {
    store: &'a S,
    assignments: &'a A,
}

impl<'a, S, A> Ledger<'a, S, A>
where
    S: TimelineStore + ?Sized,
    A: AssignmentPort + ?Sized,
{
    /// Ledger over a timeline store and an assignment registry.
    pub fn new(store: &'a S, assignments: &'a A) -> Self {
        Self { store, assignments }
    }

    /// Close the driver's open interval and open a new one in `change.status`.
    ///
    /// Returns the newly opened interval.
    ///
    /// # Errors
    /// - [`HosError::NoActiveAssignment`] when the driver has no vehicle.
    /// - [`HosError::OdometerRegression`] when `odometer` is below the latest
    ///   interval's starting reading.
    /// - [`HosError::InvalidTransition`] when the transition table forbids it.
    /// - [`HosError::NonMonotonicTimestamp`] when the change does not fall
    ///   strictly after the open interval's start, or before the end of a
    ///   closed latest interval.
    /// - [`HosError::StorageUnavailable`] on any storage failure; nothing is
    ///   written in that case.
    pub fn record_status_change(
        &self,
        change: StatusChange,
        now: DateTime<Utc>,
    ) -> Result<DutyInterval, HosError> {
        let driver = &change.driver;
        if !self.assignments.has_active_assignment(driver)? {
            return Err(HosError::NoActiveAssignment(driver.clone()));
        }

        let latest = self.store.latest_intervals(driver, 1)?.pop();
        if let Some(last) = &latest {
            if change.odometer < last.odometer_start {
                return Err(HosError::OdometerRegression {
                    last: last.odometer_start,
                    requested: change.odometer,
                });
            }
        }

        let timestamp = whole_seconds(change.timestamp.unwrap_or(now));
        let open = self.store.open_interval(driver)?;
        if let Some(open) = &open {
            if !open.status.can_transition_to(change.status) {
                return Err(HosError::InvalidTransition {
                    from: open.status,
                    to: change.status,
                });
            }
        }
        if let Some(last) = &latest {
            // An open interval needs a later start; a closed one may be continued at its end.
            let boundary = last.end.unwrap_or(last.start);
            let in_order = if last.is_open() {
                timestamp > boundary
            } else {
                timestamp >= boundary
            };
            if !in_order {
                return Err(HosError::NonMonotonicTimestamp {
                    not_before: boundary,
                    requested: timestamp,
                });
            }
        }

        let expected_open = open.as_ref().map(|iv| iv.id);
        let next = DutyInterval {
            id: IntervalId(0),
            driver: driver.clone(),
            status: change.status,
            start: timestamp,
            end: None,
            location: change.location,
            odometer_start: change.odometer,
            notes: change.notes,
            geo: change.geo,
        };
        let committed = self.store.commit_transition(expected_open, next)?;
        debug!(
            driver = %committed.driver,
            interval = committed.id.0,
            from = open.as_ref().map(|iv| iv.status.as_str()),
            to = %committed.status,
            at = %committed.start,
            "status change committed"
        );
        Ok(committed)
    }

    /// Intervals overlapping `[from, to]`, chronological.
    pub fn timeline(
        &self,
        driver: &DriverId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DutyInterval>, HosError> {
        if to < from {
            return Err(HosError::InvalidWindow {
                start: from,
                end: to,
            });
        }
        Ok(self.store.intervals_overlapping(driver, from, to)?)
    }
}
