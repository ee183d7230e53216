// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cycle/reset tracking: rest spans, the 34-hour restart, the 10-hour duty
//! reset, and the rolling 7/8-day cycle position.
//!
//! # Rest spans
//!
//! A rest span is a maximal run of OFF_DUTY/SLEEPER intervals where each
//! interval starts exactly where the previous one ended. Time past `as_of` is
//! clipped away. An ON_DUTY/DRIVING interval or a gap in the record ends the
//! run.
//!
//! # Resets
//!
//! - A span of at least 34 hours restarts the cycle at its end.
//! - A span of at least 10 hours starts a new duty period; the period begins
//!   at the first on-duty interval after it.
//!
//! When several spans qualify, the one closest to `as_of` wins.
//!
//! Split sleeper-berth pairings are not recognised: only a single contiguous
//! span counts toward either reset.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::accumulate::{day_totals, total_secs};
use crate::config::{limits, CycleRule, RuleConfig};
use crate::error::HosError;
use crate::interval::{DriverId, DutyInterval};
use crate::status::{DutyStatus, StatusSet};
use crate::store::TimelineStore;

/// A contiguous OFF_DUTY/SLEEPER run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestSpan {
    /// First instant of rest.
    pub start: DateTime<Utc>,
    /// End of rest (clipped at `as_of`).
    pub end: DateTime<Utc>,
}

impl RestSpan {
    /// Length in whole seconds.
    pub fn secs(&self) -> i64 {
        self.end.timestamp() - self.start.timestamp()
    }
}

/// Maximal rest spans in `intervals` (chronological), clipped at `as_of`.
pub fn rest_spans(intervals: &[DutyInterval], as_of: DateTime<Utc>) -> Vec<RestSpan> {
    let mut spans = Vec::new();
    let mut current: Option<RestSpan> = None;

    for iv in intervals.iter().filter(|iv| iv.start < as_of) {
        let end = iv.effective_end(as_of).min(as_of);
        if iv.status.is_rest() {
            match current.as_mut() {
                Some(span) if span.end == iv.start => span.end = end,
                _ => {
                    spans.extend(current.take());
                    current = Some(RestSpan {
                        start: iv.start,
                        end,
                    });
                }
            }
        } else {
            spans.extend(current.take());
        }
    }
    spans.extend(current);
    spans
}

/// Most recent span of at least `min_secs` ending no earlier than `not_before`.
pub fn latest_qualifying_rest(
    spans: &[RestSpan],
    min_secs: i64,
    not_before: Option<DateTime<Utc>>,
) -> Option<RestSpan> {
    spans
        .iter()
        .rev()
        .filter(|span| not_before.is_none_or(|floor| span.end >= floor))
        .find(|span| span.secs() >= min_secs)
        .copied()
}

/// Derived cycle position for a driver at `as_of`.
///
/// Recomputed on demand from the timeline; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleState {
    /// Cycle rule applied.
    pub rule: CycleRule,
    /// Evaluation instant.
    pub as_of: DateTime<Utc>,
    /// Start of the counted window: the last restart, or `as_of` minus the cycle length.
    pub window_start: DateTime<Utc>,
    /// End of the most recent qualifying 34-hour restart in the lookback window.
    pub last_reset: Option<DateTime<Utc>>,
    /// On-duty seconds counted toward the cycle limit.
    pub cycle_secs_used: i64,
    /// Distinct calendar days with on-duty time in the window.
    pub current_cycle_day: u32,
    /// On-duty seconds per calendar day in the window.
    pub on_duty_by_day: Vec<(NaiveDate, i64)>,
}

impl CycleState {
    /// Cycle hours used, for display.
    pub fn cycle_hours_used(&self) -> f64 {
        crate::accumulate::secs_to_hours(self.cycle_secs_used)
    }

    /// Seconds left before the cycle limit (never negative).
    pub fn remaining_secs(&self) -> i64 {
        (self.rule.limit_secs() - self.cycle_secs_used).max(0)
    }
}

/// The slice of a driver's timeline needed to evaluate them at `as_of`.
///
/// Loaded with one range read, so every derived value shares one consistent
/// view of the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSnapshot {
    /// Driver.
    pub driver: DriverId,
    /// Evaluation instant.
    pub as_of: DateTime<Utc>,
    /// Intervals overlapping the lookback range, chronological.
    pub intervals: Vec<DutyInterval>,
}

impl DriverSnapshot {
    /// Earliest instant a snapshot for `rule` must cover: one cycle window
    /// plus a full restart span before it.
    pub fn lookback_start(rule: CycleRule, as_of: DateTime<Utc>) -> DateTime<Utc> {
        as_of - rule.window() - Duration::seconds(limits::CYCLE_RESTART_SECS)
    }

    /// Read the lookback range for `driver` from `store`.
    pub fn load<S>(
        store: &S,
        driver: &DriverId,
        rules: &RuleConfig,
        as_of: DateTime<Utc>,
    ) -> Result<Self, HosError>
    where
        S: TimelineStore + ?Sized,
    {
        let from = Self::lookback_start(rules.cycle, as_of);
        let intervals = store.intervals_overlapping(driver, from, as_of)?;
        Ok(Self {
            driver: driver.clone(),
            as_of,
            intervals,
        })
    }

    /// Status in force at `as_of`, if any interval covers it.
    pub fn status_at(&self) -> Option<DutyStatus> {
        self.intervals
            .iter()
            .rev()
            .find(|iv| iv.start <= self.as_of && iv.end.is_none_or(|end| end > self.as_of))
            .map(|iv| iv.status)
    }

    /// Rest spans up to `as_of`.
    pub fn rest_spans(&self) -> Vec<RestSpan> {
        rest_spans(&self.intervals, self.as_of)
    }

    /// Start of the current duty period: the first on-duty instant after the
    /// most recent rest span of at least 10 hours.
    ///
    /// `None` when no on-duty time follows the last qualifying rest (the
    /// driver is resting or has never gone on duty).
    pub fn duty_period_start(&self) -> Option<DateTime<Utc>> {
        let reset = latest_qualifying_rest(&self.rest_spans(), limits::DUTY_RESET_SECS, None);
        self.intervals
            .iter()
            .filter(|iv| iv.status.is_on_duty() && iv.start <= self.as_of)
            .find(|iv| reset.is_none_or(|span| iv.start >= span.end))
            .map(|iv| iv.start)
    }

    /// Cycle position under `rules`.
    pub fn cycle_state(&self, rules: &RuleConfig) -> CycleState {
        let floor = self.as_of - rules.cycle.window();
        let reset = latest_qualifying_rest(
            &self.rest_spans(),
            limits::CYCLE_RESTART_SECS,
            Some(floor),
        );
        let window_start = reset.map_or(floor, |span| span.end);
        let used = total_secs(
            &self.intervals,
            StatusSet::ON_DUTY,
            window_start,
            self.as_of,
            self.as_of,
        );
        let by_day = day_totals(
            &self.intervals,
            StatusSet::ON_DUTY,
            window_start,
            self.as_of,
            self.as_of,
            rules.day_offset(),
        );
        let current_cycle_day =
            u32::try_from(by_day.values().filter(|secs| **secs > 0).count()).unwrap_or(u32::MAX);
        CycleState {
            rule: rules.cycle,
            as_of: self.as_of,
            window_start,
            last_reset: reset.map(|span| span.end),
            cycle_secs_used: used,
            current_cycle_day,
            on_duty_by_day: by_day.into_iter().collect(),
        }
    }
}

/// Store-backed cycle tracker.
pub struct CycleTracker<'a, S: ?Sized> {
    store: &'a S,
    rules: RuleConfig,
}

impl<'a, S> CycleTracker<'a, S>
where
    S: TimelineStore + ?Sized,
{
    /// Wrap a store.
    pub fn new(store: &'a S, rules: RuleConfig) -> Self {
        Self { store, rules }
    }

    /// Current cycle position for `driver` at `as_of`.
    pub fn current_cycle(&self, driver: &DriverId, as_of: DateTime<Utc>) -> Result<CycleState, HosError> {
        Ok(DriverSnapshot::load(self.store, driver, &self.rules, as_of)?.cycle_state(&self.rules))
    }

    /// Start of the driver's current duty period at `as_of`.
    pub fn duty_period_start(
        &self,
        driver: &DriverId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, HosError> {
        Ok(DriverSnapshot::load(self.store, driver, &self.rules, as_of)?.duty_period_start())
    }
}
