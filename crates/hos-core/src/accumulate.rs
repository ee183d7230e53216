// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hours accumulator: pure aggregation of seconds-in-status over a window.
//!
//! For every interval whose status is in the filter, the contribution is
//! `max(0, min(end ?? as_of, window_end) - max(start, window_start))`. All
//! arithmetic is in whole seconds (`i64`); hours are only produced by the
//! `*_hours` accessors at the presentation edge. Because each contribution is
//! an exact integer clamp, totals are additive over adjacent windows.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::config::RuleConfig;
use crate::error::HosError;
use crate::interval::{DriverId, DutyInterval};
use crate::status::StatusSet;
use crate::store::TimelineStore;

const DAY_SECS: i64 = 86_400;

/// Aggregated seconds-in-status over `[window_start, window_end]`.
///
/// Derived and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoursWindow {
    /// Window start.
    pub window_start: DateTime<Utc>,
    /// Window end.
    pub window_end: DateTime<Utc>,
    /// Total seconds in the filtered statuses.
    pub total_secs: i64,
    /// Per-calendar-day seconds, present when a breakdown was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_day: Option<BTreeMap<NaiveDate, i64>>,
}

impl HoursWindow {
    /// Total as fractional hours.
    pub fn total_hours(&self) -> f64 {
        secs_to_hours(self.total_secs)
    }

    /// Per-day breakdown as fractional hours (empty when not requested).
    pub fn day_hours(&self) -> Vec<(NaiveDate, f64)> {
        self.by_day
            .iter()
            .flatten()
            .map(|(day, secs)| (*day, secs_to_hours(*secs)))
            .collect()
    }
}

/// Convert whole seconds to fractional hours for display.
#[allow(clippy::cast_precision_loss)]
pub fn secs_to_hours(secs: i64) -> f64 {
    secs as f64 / 3600.0
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), HosError> {
    if end < start {
        return Err(HosError::InvalidWindow { start, end });
    }
    Ok(())
}

/// Sum the seconds `intervals` spend in `filter` within the window.
///
/// Open intervals are treated as ending at `as_of`, never past `window_end`.
pub fn accumulate(
    intervals: &[DutyInterval],
    filter: StatusSet,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    as_of: DateTime<Utc>,
) -> Result<HoursWindow, HosError> {
    check_window(window_start, window_end)?;
    Ok(HoursWindow {
        window_start,
        window_end,
        total_secs: total_secs(intervals, filter, window_start, window_end, as_of),
        by_day: None,
    })
}

/// Like [`accumulate`], also splitting contributions at calendar-day
/// boundaries in `offset`.
pub fn accumulate_by_day(
    intervals: &[DutyInterval],
    filter: StatusSet,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    as_of: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<HoursWindow, HosError> {
    check_window(window_start, window_end)?;
    let by_day = day_totals(intervals, filter, window_start, window_end, as_of, offset);
    Ok(HoursWindow {
        window_start,
        window_end,
        total_secs: by_day.values().sum(),
        by_day: Some(by_day),
    })
}

/// Infallible core of [`accumulate`]; an inverted window sums to zero.
pub(crate) fn total_secs(
    intervals: &[DutyInterval],
    filter: StatusSet,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    as_of: DateTime<Utc>,
) -> i64 {
    intervals
        .iter()
        .filter(|iv| filter.contains(iv.status))
        .map(|iv| iv.secs_within(window_start, window_end, as_of))
        .sum()
}

/// Infallible core of [`accumulate_by_day`].
pub(crate) fn day_totals(
    intervals: &[DutyInterval],
    filter: StatusSet,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    as_of: DateTime<Utc>,
    offset: FixedOffset,
) -> BTreeMap<NaiveDate, i64> {
    let off = i64::from(offset.local_minus_utc());
    let mut by_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();

    for iv in intervals.iter().filter(|iv| filter.contains(iv.status)) {
        let lo = iv.start.timestamp().max(window_start.timestamp());
        let hi = iv
            .effective_end(as_of)
            .timestamp()
            .min(window_end.timestamp());
        let mut cursor = lo;
        while cursor < hi {
            let day_start_local = (cursor + off).div_euclid(DAY_SECS) * DAY_SECS;
            let piece_end = (day_start_local + DAY_SECS - off).min(hi);
            let Some(date) = DateTime::from_timestamp(day_start_local, 0).map(|d| d.date_naive())
            else {
                break;
            };
            *by_day.entry(date).or_insert(0) += piece_end - cursor;
            cursor = piece_end;
        }
    }
    by_day
}

/// Store-backed accumulator for a single driver.
pub struct HoursAccumulator<'a, S: ?Sized> {
    store: &'a S,
    rules: RuleConfig,
}

impl<'a, S> HoursAccumulator<'a, S>
where
    S: TimelineStore + ?Sized,
{
    /// Wrap a store.
    pub fn new(store: &'a S, rules: RuleConfig) -> Self {
        Self { store, rules }
    }

    /// [`accumulate`] over the driver's intervals overlapping the window.
    pub fn accumulate(
        &self,
        driver: &DriverId,
        filter: StatusSet,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<HoursWindow, HosError> {
        check_window(window_start, window_end)?;
        let intervals = self
            .store
            .intervals_overlapping(driver, window_start, window_end)?;
        accumulate(&intervals, filter, window_start, window_end, as_of)
    }

    /// [`accumulate_by_day`] using the configured home-terminal offset.
    pub fn accumulate_by_day(
        &self,
        driver: &DriverId,
        filter: StatusSet,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<HoursWindow, HosError> {
        check_window(window_start, window_end)?;
        let intervals = self
            .store
            .intervals_overlapping(driver, window_start, window_end)?;
        accumulate_by_day(
            &intervals,
            filter,
            window_start,
            window_end,
            as_of,
            self.rules.day_offset(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::interval::IntervalId;
    use crate::status::DutyStatus;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    fn iv(status: DutyStatus, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> DutyInterval {
        DutyInterval {
            id: IntervalId(0),
            driver: DriverId::new("d1"),
            status,
            start,
            end,
            location: String::new(),
            odometer_start: 0,
            notes: None,
            geo: None,
        }
    }

    fn day() -> Vec<DutyInterval> {
        vec![
            iv(DutyStatus::OffDuty, at(4, 0, 0), Some(at(4, 6, 0))),
            iv(DutyStatus::OnDuty, at(4, 6, 0), Some(at(4, 7, 0))),
            iv(DutyStatus::Driving, at(4, 7, 0), Some(at(4, 12, 0))),
            iv(DutyStatus::OnDuty, at(4, 12, 0), Some(at(4, 12, 30))),
            iv(DutyStatus::Driving, at(4, 12, 30), None),
        ]
    }

    #[test]
    fn sums_filtered_statuses() {
        let as_of = at(4, 15, 0);
        let driving = accumulate(&day(), StatusSet::DRIVING_ONLY, at(4, 0, 0), as_of, as_of).unwrap();
        assert_eq!(driving.total_secs, 5 * 3600 + 150 * 60);
        let on_duty = accumulate(&day(), StatusSet::ON_DUTY, at(4, 0, 0), as_of, as_of).unwrap();
        assert_eq!(on_duty.total_secs, 9 * 3600);
        assert!((on_duty.total_hours() - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn open_interval_never_extends_past_window_end() {
        let as_of = at(4, 20, 0);
        let window = accumulate(&day(), StatusSet::DRIVING_ONLY, at(4, 12, 0), at(4, 13, 0), as_of).unwrap();
        assert_eq!(window.total_secs, 30 * 60);
    }

    #[test]
    fn open_interval_ends_at_as_of() {
        let window = accumulate(&day(), StatusSet::DRIVING_ONLY, at(4, 12, 0), at(4, 23, 0), at(4, 13, 0)).unwrap();
        assert_eq!(window.total_secs, 30 * 60);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = accumulate(&day(), StatusSet::ALL, at(4, 12, 0), at(4, 11, 0), at(4, 12, 0)).unwrap_err();
        assert!(matches!(err, HosError::InvalidWindow { .. }));
    }

    #[test]
    fn empty_window_is_zero() {
        let w = accumulate(&day(), StatusSet::ALL, at(4, 9, 0), at(4, 9, 0), at(4, 23, 0)).unwrap();
        assert_eq!(w.total_secs, 0);
    }

    #[test]
    fn day_breakdown_splits_at_midnight() {
        let overnight = vec![iv(DutyStatus::Driving, at(4, 22, 0), Some(at(5, 3, 0)))];
        let w = accumulate_by_day(
            &overnight,
            StatusSet::ON_DUTY,
            at(4, 0, 0),
            at(6, 0, 0),
            at(6, 0, 0),
            FixedOffset::east_opt(0).unwrap(),
        )
        .unwrap();
        let days = w.by_day.unwrap();
        assert_eq!(days.get(&NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()), Some(&(2 * 3600)));
        assert_eq!(days.get(&NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()), Some(&(3 * 3600)));
        assert_eq!(w.total_secs, 5 * 3600);
    }

    #[test]
    fn day_breakdown_honours_home_terminal_offset() {
        // 22:00-03:00 UTC is 17:00-22:00 at UTC-5: a single local day.
        let overnight = vec![iv(DutyStatus::Driving, at(4, 22, 0), Some(at(5, 3, 0)))];
        let w = accumulate_by_day(
            &overnight,
            StatusSet::ON_DUTY,
            at(4, 0, 0),
            at(6, 0, 0),
            at(6, 0, 0),
            FixedOffset::west_opt(5 * 3600).unwrap(),
        )
        .unwrap();
        let days = w.by_day.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days.get(&NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()), Some(&(5 * 3600)));
    }

    #[test]
    fn by_day_total_matches_plain_total() {
        let as_of = at(5, 2, 0);
        let plain = accumulate(&day(), StatusSet::ON_DUTY, at(4, 0, 0), as_of, as_of).unwrap();
        let split = accumulate_by_day(
            &day(),
            StatusSet::ON_DUTY,
            at(4, 0, 0),
            as_of,
            as_of,
            FixedOffset::east_opt(0).unwrap(),
        )
        .unwrap();
        assert_eq!(plain.total_secs, split.total_secs);
        let summed: i64 = split.by_day.iter().flatten().map(|(_, s)| *s).sum();
        assert_eq!(summed, plain.total_secs);
    }
}
