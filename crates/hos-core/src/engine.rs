// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Synchronous façade over the ledger, accumulator, cycle tracker, rule
//! engine, and violation store, sharing one pair of ports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::accumulate::{HoursAccumulator, HoursWindow};
use crate::config::RuleConfig;
use crate::cycle::{CycleState, CycleTracker, DriverSnapshot};
use crate::error::HosError;
use crate::interval::{DriverId, DutyInterval};
use crate::ledger::{Ledger, StatusChange};
use crate::rules::{HoursSummary, RuleEngine};
use crate::status::StatusSet;
use crate::store::{AssignmentPort, TimelineStore};
use crate::violation::{Violation, ViolationId, ViolationKind, ViolationStore};

/// Every engine operation over shared storage and assignment ports.
///
/// Cloning is cheap: both ports are reference-counted.
pub struct ComplianceEngine<S: ?Sized, A: ?Sized> {
    store: Arc<S>,
    assignments: Arc<A>,
    rules: RuleEngine,
}

impl<S: ?Sized, A: ?Sized> Clone for ComplianceEngine<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            assignments: Arc::clone(&self.assignments),
            rules: self.rules,
        }
    }
}

impl<S, A> ComplianceEngine<S, A>
where
    S: TimelineStore + ?Sized,
    A: AssignmentPort + ?Sized,
{
    /// Engine over the given ports.
    pub fn new(store: Arc<S>, assignments: Arc<A>, rules: RuleConfig) -> Self {
        Self {
            store,
            assignments,
            rules: RuleEngine::new(rules),
        }
    }

    /// Timeline storage.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Assignment registry.
    pub fn assignments(&self) -> &Arc<A> {
        &self.assignments
    }

    /// Rule configuration in force.
    pub fn rules(&self) -> &RuleConfig {
        self.rules.rules()
    }

    /// See [`Ledger::record_status_change`].
    pub fn record_status_change(
        &self,
        change: StatusChange,
        now: DateTime<Utc>,
    ) -> Result<DutyInterval, HosError> {
        Ledger::new(&*self.store, &*self.assignments).record_status_change(change, now)
    }

    /// See [`Ledger::timeline`].
    pub fn timeline(
        &self,
        driver: &DriverId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DutyInterval>, HosError> {
        Ledger::new(&*self.store, &*self.assignments).timeline(driver, from, to)
    }

    /// See [`HoursAccumulator::accumulate`].
    pub fn accumulate(
        &self,
        driver: &DriverId,
        filter: StatusSet,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<HoursWindow, HosError> {
        HoursAccumulator::new(&*self.store, *self.rules())
            .accumulate(driver, filter, window_start, window_end, as_of)
    }

    /// See [`HoursAccumulator::accumulate_by_day`].
    pub fn accumulate_by_day(
        &self,
        driver: &DriverId,
        filter: StatusSet,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<HoursWindow, HosError> {
        HoursAccumulator::new(&*self.store, *self.rules())
            .accumulate_by_day(driver, filter, window_start, window_end, as_of)
    }

    /// See [`CycleTracker::current_cycle`].
    pub fn current_cycle(
        &self,
        driver: &DriverId,
        as_of: DateTime<Utc>,
    ) -> Result<CycleState, HosError> {
        CycleTracker::new(&*self.store, *self.rules()).current_cycle(driver, as_of)
    }

    /// See [`CycleTracker::duty_period_start`].
    pub fn duty_period_start(
        &self,
        driver: &DriverId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, HosError> {
        CycleTracker::new(&*self.store, *self.rules()).duty_period_start(driver, as_of)
    }

    /// Read everything the rules need for `driver` at `as_of`.
    pub fn snapshot(&self, driver: &DriverId, as_of: DateTime<Utc>) -> Result<DriverSnapshot, HosError> {
        DriverSnapshot::load(&*self.store, driver, self.rules(), as_of)
    }

    /// Usage against every limit at `as_of`.
    pub fn hours_summary(
        &self,
        driver: &DriverId,
        as_of: DateTime<Utc>,
    ) -> Result<HoursSummary, HosError> {
        let snapshot = self.snapshot(driver, as_of)?;
        Ok(HoursSummary::from_snapshot(&snapshot, self.rules()))
    }

    /// Run the rule engine for `driver` at `as_of` and record new violations.
    ///
    /// Returns only violations created by this call. Evaluating again at the
    /// same instant creates nothing while the earlier ones stay unresolved.
    pub fn evaluate(&self, driver: &DriverId, as_of: DateTime<Utc>) -> Result<Vec<Violation>, HosError> {
        let snapshot = self.snapshot(driver, as_of)?;
        let violations = ViolationStore::new(&*self.store);
        let open: Vec<ViolationKind> = violations
            .list_unresolved(driver)?
            .into_iter()
            .map(|v| v.kind)
            .collect();

        let drafts = self.rules.evaluate(&snapshot, &open);
        debug!(driver = %driver, drafts = drafts.len(), "rules evaluated");
        let mut recorded = Vec::with_capacity(drafts.len());
        for draft in drafts {
            recorded.extend(violations.record_unless_open(draft)?);
        }
        Ok(recorded)
    }

    /// See [`ViolationStore::list_unresolved`].
    pub fn unresolved_violations(&self, driver: &DriverId) -> Result<Vec<Violation>, HosError> {
        ViolationStore::new(&*self.store).list_unresolved(driver)
    }

    /// See [`ViolationStore::get`].
    pub fn violation(&self, id: ViolationId) -> Result<Violation, HosError> {
        ViolationStore::new(&*self.store).get(id)
    }

    /// See [`ViolationStore::list`].
    pub fn violations(&self, driver: &DriverId) -> Result<Vec<Violation>, HosError> {
        ViolationStore::new(&*self.store).list(driver)
    }

    /// See [`ViolationStore::resolve`].
    pub fn resolve(
        &self,
        id: ViolationId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Violation, HosError> {
        ViolationStore::new(&*self.store).resolve(id, notes, now)
    }

    /// Every driver with a timeline.
    pub fn drivers(&self) -> Result<Vec<DriverId>, HosError> {
        Ok(self.store.drivers()?)
    }
}
