// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Interval model: per-driver, ordered, non-overlapping duty-status intervals.
//!
//! # Invariants
//!
//! - `end` is either `None` (open) or strictly greater than `start`.
//! - A driver has at most one open interval, and it is the latest one.
//! - Intervals are ordered by `start`; `prev.end <= next.start`.
//!
//! Only the ledger creates or closes intervals. Everything else reads.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::status::DutyStatus;

/// Opaque driver identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Store-assigned interval identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalId(pub u64);

/// Location fix attached to a status change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Horizontal accuracy in metres.
    pub accuracy_m: Option<f64>,
}

/// A single duty-status interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyInterval {
    /// Store-assigned id; `IntervalId(0)` until persisted.
    pub id: IntervalId,
    /// Owning driver.
    pub driver: DriverId,
    /// Duty status for the whole interval.
    pub status: DutyStatus,
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end; `None` while open.
    pub end: Option<DateTime<Utc>>,
    /// Free-form location text.
    pub location: String,
    /// Odometer reading at `start`.
    pub odometer_start: u64,
    /// Optional driver notes.
    pub notes: Option<String>,
    /// Optional GPS fix.
    pub geo: Option<GeoFix>,
}

impl DutyInterval {
    /// Returns `true` while the interval has no recorded end.
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// End used for aggregation: the recorded end, or `as_of` while open.
    pub fn effective_end(&self, as_of: DateTime<Utc>) -> DateTime<Utc> {
        self.end.unwrap_or(as_of)
    }

    /// Whole seconds this interval contributes to `[from, to]`, treating an
    /// open interval as ending at `as_of`.
    pub fn secs_within(&self, from: DateTime<Utc>, to: DateTime<Utc>, as_of: DateTime<Utc>) -> i64 {
        let lo = self.start.timestamp().max(from.timestamp());
        let hi = self.effective_end(as_of).timestamp().min(to.timestamp());
        (hi - lo).max(0)
    }

    /// Whether the interval touches `[from, to]`. An interval starting exactly
    /// at `to` matches so the status in force at `to` is always visible.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start <= to && self.end.is_none_or(|end| end > from)
    }
}

/// Drop sub-second precision; the engine works in whole seconds.
pub fn whole_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// A structural defect found by [`check_timeline`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineDefect {
    /// An interval's end is not after its start.
    #[error("interval {0:?} has end <= start")]
    EmptyInterval(IntervalId),
    /// Two intervals overlap in time.
    #[error("intervals {0:?} and {1:?} overlap")]
    Overlap(IntervalId, IntervalId),
    /// An open interval is followed by another interval.
    #[error("open interval {0:?} is not the latest")]
    OpenNotLast(IntervalId),
    /// Intervals are not sorted by start.
    #[error("intervals {0:?} and {1:?} are out of order")]
    OutOfOrder(IntervalId, IntervalId),
}

/// Verify the interval-model invariants over one driver's timeline.
///
/// Used by stores in debug assertions and by the property tests.
pub fn check_timeline(intervals: &[DutyInterval]) -> Result<(), TimelineDefect> {
    for iv in intervals {
        if iv.end.is_some_and(|end| end <= iv.start) {
            return Err(TimelineDefect::EmptyInterval(iv.id));
        }
    }
    for pair in intervals.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.start < prev.start {
            return Err(TimelineDefect::OutOfOrder(prev.id, next.id));
        }
        match prev.end {
            None => return Err(TimelineDefect::OpenNotLast(prev.id)),
            Some(end) if end > next.start => {
                return Err(TimelineDefect::Overlap(prev.id, next.id));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
