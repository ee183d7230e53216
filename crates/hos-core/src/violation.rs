// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Violation records and the violation store.
//!
//! The rule engine produces [`ViolationDraft`]s; the [`ViolationStore`] turns
//! them into persisted [`Violation`]s. Violations are never deleted: the only
//! mutation after creation is [`ViolationStore::resolve`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::HosError;
use crate::interval::DriverId;
use crate::store::TimelineStore;

/// Store-assigned violation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViolationId(pub u64);

impl std::fmt::Display for ViolationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Severity of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Notable, not blocking.
    Minor,
    /// Limit breached.
    Major,
    /// Multi-day limit breached; the driver must stop.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minor => write!(f, "MINOR"),
            Self::Major => write!(f, "MAJOR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Which limit was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// More than 11 hours driving in the current duty period.
    DriveTimeExceeded,
    /// On duty more than 14 hours after the duty period began.
    DutyWindowExceeded,
    /// 7/8-day cycle hours exceeded.
    CycleHoursExceeded,
}

impl ViolationKind {
    /// Severity assigned by the rule engine.
    pub fn severity(self) -> Severity {
        match self {
            Self::DriveTimeExceeded | Self::DutyWindowExceeded => Severity::Major,
            Self::CycleHoursExceeded => Severity::Critical,
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DriveTimeExceeded => "DRIVE_TIME_EXCEEDED",
            Self::DutyWindowExceeded => "DUTY_WINDOW_EXCEEDED",
            Self::CycleHoursExceeded => "CYCLE_HOURS_EXCEEDED",
        };
        write!(f, "{s}")
    }
}

/// A violation detected by the rule engine but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationDraft {
    /// Driver in breach.
    pub driver: DriverId,
    /// Limit breached.
    pub kind: ViolationKind,
    /// Severity.
    pub severity: Severity,
    /// Evaluation instant.
    pub detected_at: DateTime<Utc>,
    /// Observed total in seconds.
    pub observed_secs: i64,
    /// Limit in seconds.
    pub limit_secs: i64,
    /// Human-readable description.
    pub message: String,
}

impl ViolationDraft {
    /// Creates a draft with the kind's default severity.
    pub fn new(
        driver: DriverId,
        kind: ViolationKind,
        detected_at: DateTime<Utc>,
        observed_secs: i64,
        limit_secs: i64,
    ) -> Self {
        let message = format!(
            "{kind}: {} used against a limit of {}",
            format_hm(observed_secs),
            format_hm(limit_secs)
        );
        Self {
            driver,
            kind,
            severity: kind.severity(),
            detected_at,
            observed_secs,
            limit_secs,
            message,
        }
    }
}

/// A persisted violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Store-assigned id.
    pub id: ViolationId,
    /// Driver in breach.
    pub driver: DriverId,
    /// Limit breached.
    pub kind: ViolationKind,
    /// Severity.
    pub severity: Severity,
    /// Evaluation instant.
    pub detected_at: DateTime<Utc>,
    /// Observed total in seconds.
    pub observed_secs: i64,
    /// Limit in seconds.
    pub limit_secs: i64,
    /// Human-readable description.
    pub message: String,
    /// Whether an operator resolved it.
    pub resolved: bool,
    /// When it was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Operator notes recorded on resolution.
    pub resolved_notes: Option<String>,
}

impl Violation {
    /// Materialize a draft under a store-assigned id. Always unresolved.
    pub fn from_draft(id: ViolationId, draft: ViolationDraft) -> Self {
        Self {
            id,
            driver: draft.driver,
            kind: draft.kind,
            severity: draft.severity,
            detected_at: draft.detected_at,
            observed_secs: draft.observed_secs,
            limit_secs: draft.limit_secs,
            message: draft.message,
            resolved: false,
            resolved_at: None,
            resolved_notes: None,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} {}: {}", self.severity, self.id, self.driver, self.message)
    }
}

fn format_hm(secs: i64) -> String {
    let mins = secs / 60;
    format!("{}h{:02}m", mins / 60, mins % 60)
}

/// Records, lists, and resolves violations over a [`TimelineStore`].
pub struct ViolationStore<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> ViolationStore<'a, S>
where
    S: TimelineStore + ?Sized,
{
    /// Wrap a store.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Persist a draft as a new unresolved violation.
    pub fn record(&self, draft: ViolationDraft) -> Result<Violation, HosError> {
        let violation = self.store.insert_violation(draft)?;
        warn!(
            driver = %violation.driver,
            id = %violation.id,
            kind = %violation.kind,
            severity = %violation.severity,
            "violation recorded"
        );
        Ok(violation)
    }

    /// Persist a draft unless an unresolved violation of the same kind exists
    /// for the driver. Returns `None` when an open one is already on file.
    pub fn record_unless_open(&self, draft: ViolationDraft) -> Result<Option<Violation>, HosError> {
        let inserted = self.store.insert_violation_unless_open(draft)?;
        if let Some(v) = &inserted {
            warn!(
                driver = %v.driver,
                id = %v.id,
                kind = %v.kind,
                severity = %v.severity,
                "violation recorded"
            );
        }
        Ok(inserted)
    }

    /// Unresolved violations for `driver`, oldest first.
    pub fn list_unresolved(&self, driver: &DriverId) -> Result<Vec<Violation>, HosError> {
        let mut all = self.store.violations(driver)?;
        all.retain(|v| !v.resolved);
        Ok(all)
    }

    /// Look up one violation.
    pub fn get(&self, id: ViolationId) -> Result<Violation, HosError> {
        Ok(self.store.violation(id)?)
    }

    /// Every violation for `driver`, oldest first.
    pub fn list(&self, driver: &DriverId) -> Result<Vec<Violation>, HosError> {
        Ok(self.store.violations(driver)?)
    }

    /// Mark a violation resolved at `now`.
    pub fn resolve(
        &self,
        id: ViolationId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Violation, HosError> {
        let resolved = self.store.resolve_violation(id, notes, now)?;
        info!(id = %resolved.id, driver = %resolved.driver, "violation resolved");
        Ok(resolved)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryTimelineStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn draft(driver: &str, kind: ViolationKind) -> ViolationDraft {
        ViolationDraft::new(DriverId::new(driver), kind, now(), 11 * 3600 + 300, 11 * 3600)
    }

    #[test]
    fn draft_message_and_severity() {
        let d = draft("d1", ViolationKind::DriveTimeExceeded);
        assert_eq!(d.severity, Severity::Major);
        assert_eq!(
            d.message,
            "DRIVE_TIME_EXCEEDED: 11h05m used against a limit of 11h00m"
        );
        assert_eq!(ViolationKind::CycleHoursExceeded.severity(), Severity::Critical);
        assert!(Severity::Critical > Severity::Major);
    }

    #[test]
    fn record_list_resolve() {
        let store = MemoryTimelineStore::new();
        let violations = ViolationStore::new(&store);
        let driver = DriverId::new("d1");

        let v = violations
            .record(draft("d1", ViolationKind::DriveTimeExceeded))
            .unwrap();
        assert!(!v.resolved);
        assert_eq!(violations.list_unresolved(&driver).unwrap().len(), 1);

        let resolved = violations
            .resolve(v.id, Some("reviewed".into()), now())
            .unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_at, Some(now()));
        assert_eq!(resolved.resolved_notes.as_deref(), Some("reviewed"));
        assert!(violations.list_unresolved(&driver).unwrap().is_empty());
        assert_eq!(violations.list(&driver).unwrap().len(), 1);
        assert_eq!(violations.get(v.id).unwrap(), resolved);
    }

    #[test]
    fn resolving_twice_fails_with_already_resolved() {
        let store = MemoryTimelineStore::new();
        let violations = ViolationStore::new(&store);
        let v = violations
            .record(draft("d1", ViolationKind::CycleHoursExceeded))
            .unwrap();
        violations.resolve(v.id, None, now()).unwrap();
        assert_eq!(
            violations.resolve(v.id, None, now()),
            Err(HosError::AlreadyResolved(v.id))
        );
    }

    #[test]
    fn resolving_unknown_fails_with_not_found() {
        let store = MemoryTimelineStore::new();
        let violations = ViolationStore::new(&store);
        assert_eq!(
            violations.resolve(ViolationId(99), None, now()),
            Err(HosError::NotFound(ViolationId(99)))
        );
        assert_eq!(
            violations.get(ViolationId(99)),
            Err(HosError::NotFound(ViolationId(99)))
        );
    }

    #[test]
    fn record_unless_open_skips_duplicate_kind() {
        let store = MemoryTimelineStore::new();
        let violations = ViolationStore::new(&store);
        let first = violations
            .record_unless_open(draft("d1", ViolationKind::DutyWindowExceeded))
            .unwrap();
        assert!(first.is_some());
        let second = violations
            .record_unless_open(draft("d1", ViolationKind::DutyWindowExceeded))
            .unwrap();
        assert!(second.is_none());
        let other_driver = violations
            .record_unless_open(draft("d2", ViolationKind::DutyWindowExceeded))
            .unwrap();
        assert!(other_driver.is_some());
    }
}
