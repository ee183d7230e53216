// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Compliance rule engine.
//!
//! [`RuleEngine::evaluate`] is a pure function of a [`DriverSnapshot`] and the
//! kinds already open for the driver. It cannot fail: every input it needs was
//! read before it runs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::accumulate::total_secs;
use crate::config::{limits, RuleConfig};
use crate::cycle::{CycleState, DriverSnapshot};
use crate::status::{DutyStatus, StatusSet};
use crate::violation::{ViolationDraft, ViolationKind};

/// Per-driver usage against every limit at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoursSummary {
    /// Evaluation instant.
    pub as_of: DateTime<Utc>,
    /// Status in force at `as_of`.
    pub status: Option<DutyStatus>,
    /// Start of the current duty period.
    pub duty_period_start: Option<DateTime<Utc>>,
    /// Driving seconds since the duty period began.
    pub drive_secs_used: i64,
    /// Driving seconds left (clamped at 0).
    pub drive_secs_remaining: i64,
    /// Elapsed seconds since the duty period began.
    pub window_secs_used: i64,
    /// Window seconds left (clamped at 0).
    pub window_secs_remaining: i64,
    /// Cycle position.
    pub cycle: CycleState,
    /// Cycle seconds left (clamped at 0).
    pub cycle_secs_remaining: i64,
}

impl HoursSummary {
    /// Derive a summary from a snapshot.
    pub fn from_snapshot(snapshot: &DriverSnapshot, rules: &RuleConfig) -> Self {
        let as_of = snapshot.as_of;
        let duty_period_start = snapshot.duty_period_start();
        let (drive, window) = match duty_period_start {
            Some(start) => (
                total_secs(&snapshot.intervals, StatusSet::DRIVING_ONLY, start, as_of, as_of),
                as_of.timestamp() - start.timestamp(),
            ),
            None => (0, 0),
        };
        let cycle = snapshot.cycle_state(rules);
        Self {
            as_of,
            status: snapshot.status_at(),
            duty_period_start,
            drive_secs_used: drive,
            drive_secs_remaining: (limits::MAX_DRIVE_SECS - drive).max(0),
            window_secs_used: window,
            window_secs_remaining: (limits::MAX_DUTY_WINDOW_SECS - window).max(0),
            cycle_secs_remaining: cycle.remaining_secs(),
            cycle,
        }
    }
}

/// Applies the drive, window, and cycle limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine {
    rules: RuleConfig,
}

impl RuleEngine {
    /// Engine for the given rule configuration.
    pub fn new(rules: RuleConfig) -> Self {
        Self { rules }
    }

    /// Rule configuration in force.
    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    /// Draft every violation present at `snapshot.as_of`, skipping kinds in
    /// `open_kinds` (already unresolved for this driver).
    pub fn evaluate(
        &self,
        snapshot: &DriverSnapshot,
        open_kinds: &[ViolationKind],
    ) -> Vec<ViolationDraft> {
        let summary = HoursSummary::from_snapshot(snapshot, &self.rules);
        self.check(snapshot, &summary)
            .into_iter()
            .filter(|draft| !open_kinds.contains(&draft.kind))
            .collect()
    }

    /// Limits breached by `summary`, ignoring what is already open.
    pub fn check(&self, snapshot: &DriverSnapshot, summary: &HoursSummary) -> Vec<ViolationDraft> {
        let mut drafts = Vec::new();
        let draft = |kind, observed, limit| {
            ViolationDraft::new(snapshot.driver.clone(), kind, snapshot.as_of, observed, limit)
        };

        if summary.drive_secs_used > limits::MAX_DRIVE_SECS {
            drafts.push(draft(
                ViolationKind::DriveTimeExceeded,
                summary.drive_secs_used,
                limits::MAX_DRIVE_SECS,
            ));
        }

        let on_duty_now = summary.status.is_some_and(DutyStatus::is_on_duty);
        if on_duty_now && summary.window_secs_used > limits::MAX_DUTY_WINDOW_SECS {
            drafts.push(draft(
                ViolationKind::DutyWindowExceeded,
                summary.window_secs_used,
                limits::MAX_DUTY_WINDOW_SECS,
            ));
        }

        let cycle_limit = self.rules.cycle.limit_secs();
        if summary.cycle.cycle_secs_used > cycle_limit {
            drafts.push(draft(
                ViolationKind::CycleHoursExceeded,
                summary.cycle.cycle_secs_used,
                cycle_limit,
            ));
        }
        drafts
    }
}
