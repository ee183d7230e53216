// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory storage ports.
//!
//! [`MemoryTimelineStore`] backs tests and the replay tool. All state sits
//! behind one `RwLock`, so a commit is visible to readers as a single unit.
//! A poisoned lock is reported as [`StoreError::Unavailable`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::interval::{check_timeline, DriverId, DutyInterval, IntervalId};
use crate::store::{AssignmentPort, StoreError, TimelineStore};
use crate::violation::{Violation, ViolationDraft, ViolationId};

#[derive(Default)]
struct State {
    timelines: BTreeMap<DriverId, Vec<DutyInterval>>,
    violations: BTreeMap<ViolationId, Violation>,
    next_interval: u64,
    next_violation: u64,
}

impl State {
    fn alloc_interval(&mut self) -> IntervalId {
        self.next_interval += 1;
        IntervalId(self.next_interval)
    }

    fn alloc_violation(&mut self) -> ViolationId {
        self.next_violation += 1;
        ViolationId(self.next_violation)
    }

    fn push_violation(&mut self, draft: ViolationDraft) -> Violation {
        let id = self.alloc_violation();
        let violation = Violation::from_draft(id, draft);
        self.violations.insert(id, violation.clone());
        violation
    }
}

/// `TimelineStore` kept entirely in memory.
#[derive(Default)]
pub struct MemoryTimelineStore {
    state: RwLock<State>,
    offline: AtomicBool,
}

impl MemoryTimelineStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while offline every call fails with
    /// [`StoreError::Unavailable`] and nothing is written.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Load a pre-built timeline for one driver, bypassing the ledger.
    ///
    /// All intervals must belong to the same driver, satisfy the
    /// interval-model invariants, and follow anything already stored for that
    /// driver. Ids are reassigned. Nothing is written on error.
    pub fn seed(&self, intervals: Vec<DutyInterval>) -> Result<Vec<DutyInterval>, StoreError> {
        let Some(driver) = intervals.first().map(|iv| iv.driver.clone()) else {
            return Ok(Vec::new());
        };
        if intervals.iter().any(|iv| iv.driver != driver) {
            return Err(StoreError::Conflict("seed spans multiple drivers".into()));
        }
        let mut state = self.write()?;
        let mut candidate = state.timelines.get(&driver).cloned().unwrap_or_default();
        candidate.extend(intervals.iter().cloned());
        check_timeline(&candidate).map_err(|defect| StoreError::Conflict(defect.to_string()))?;

        let mut seeded = Vec::with_capacity(intervals.len());
        for mut iv in intervals {
            iv.id = state.alloc_interval();
            seeded.push(iv);
        }
        state
            .timelines
            .entry(driver)
            .or_default()
            .extend(seeded.iter().cloned());
        Ok(seeded)
    }

    /// Full timeline for `driver`, chronological.
    pub fn timeline(&self, driver: &DriverId) -> Result<Vec<DutyInterval>, StoreError> {
        Ok(self
            .read()?
            .timelines
            .get(driver)
            .cloned()
            .unwrap_or_default())
    }

    fn guard(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.guard()?;
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("timeline lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.guard()?;
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("timeline lock poisoned".into()))
    }
}

impl TimelineStore for MemoryTimelineStore {
    fn latest_intervals(
        &self,
        driver: &DriverId,
        limit: usize,
    ) -> Result<Vec<DutyInterval>, StoreError> {
        let state = self.read()?;
        let Some(timeline) = state.timelines.get(driver) else {
            return Ok(Vec::new());
        };
        let skip = timeline.len().saturating_sub(limit);
        Ok(timeline[skip..].to_vec())
    }

    fn open_interval(&self, driver: &DriverId) -> Result<Option<DutyInterval>, StoreError> {
        let state = self.read()?;
        Ok(state
            .timelines
            .get(driver)
            .and_then(|timeline| timeline.last())
            .filter(|iv| iv.is_open())
            .cloned())
    }

    fn intervals_overlapping(
        &self,
        driver: &DriverId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DutyInterval>, StoreError> {
        let state = self.read()?;
        let Some(timeline) = state.timelines.get(driver) else {
            return Ok(Vec::new());
        };
        // Sorted by start: everything past the first start > `to` is irrelevant.
        let upper = timeline.partition_point(|iv| iv.start <= to);
        Ok(timeline[..upper]
            .iter()
            .filter(|iv| iv.overlaps(from, to))
            .cloned()
            .collect())
    }

    fn commit_transition(
        &self,
        expected_open: Option<IntervalId>,
        mut next: DutyInterval,
    ) -> Result<DutyInterval, StoreError> {
        if next.end.is_some() {
            return Err(StoreError::Conflict("appended interval must be open".into()));
        }
        let mut state = self.write()?;
        let last = state.timelines.get(&next.driver).and_then(|t| t.last());
        let current_open = last.filter(|iv| iv.is_open()).map(|iv| iv.id);
        if current_open != expected_open {
            return Err(StoreError::Conflict(format!(
                "open interval for {} is {current_open:?}, expected {expected_open:?}",
                next.driver
            )));
        }
        if let Some(last) = last {
            if next.start <= last.start || last.end.is_some_and(|end| end > next.start) {
                return Err(StoreError::Conflict(format!(
                    "interval starting {} would overlap interval {:?}",
                    next.start, last.id
                )));
            }
        }

        next.id = state.alloc_interval();
        let timeline = state.timelines.entry(next.driver.clone()).or_default();
        if let Some(open) = timeline.last_mut().filter(|iv| iv.is_open()) {
            open.end = Some(next.start);
        }
        timeline.push(next.clone());
        debug_assert!(check_timeline(timeline).is_ok());
        Ok(next)
    }

    fn drivers(&self) -> Result<Vec<DriverId>, StoreError> {
        Ok(self.read()?.timelines.keys().cloned().collect())
    }

    fn insert_violation(&self, draft: ViolationDraft) -> Result<Violation, StoreError> {
        Ok(self.write()?.push_violation(draft))
    }

    fn insert_violation_unless_open(
        &self,
        draft: ViolationDraft,
    ) -> Result<Option<Violation>, StoreError> {
        let mut state = self.write()?;
        let duplicate = state
            .violations
            .values()
            .any(|v| !v.resolved && v.driver == draft.driver && v.kind == draft.kind);
        if duplicate {
            return Ok(None);
        }
        Ok(Some(state.push_violation(draft)))
    }

    fn violation(&self, id: ViolationId) -> Result<Violation, StoreError> {
        self.read()?
            .violations
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn violations(&self, driver: &DriverId) -> Result<Vec<Violation>, StoreError> {
        Ok(self
            .read()?
            .violations
            .values()
            .filter(|v| &v.driver == driver)
            .cloned()
            .collect())
    }

    fn resolve_violation(
        &self,
        id: ViolationId,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Violation, StoreError> {
        let mut state = self.write()?;
        let violation = state
            .violations
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        if violation.resolved {
            return Err(StoreError::AlreadyResolved(id));
        }
        violation.resolved = true;
        violation.resolved_at = Some(at);
        violation.resolved_notes = notes;
        Ok(violation.clone())
    }
}

/// In-memory driver → vehicle assignment registry.
#[derive(Default)]
pub struct MemoryAssignments {
    active: RwLock<HashMap<DriverId, String>>,
}

impl MemoryAssignments {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `vehicle` to `driver`, replacing any previous assignment.
    pub fn assign(&self, driver: DriverId, vehicle: impl Into<String>) -> Result<(), StoreError> {
        self.active
            .write()
            .map_err(|_| StoreError::Unavailable("assignment lock poisoned".into()))?
            .insert(driver, vehicle.into());
        Ok(())
    }

    /// End the driver's active assignment. Returns the vehicle it held.
    pub fn unassign(&self, driver: &DriverId) -> Result<Option<String>, StoreError> {
        Ok(self
            .active
            .write()
            .map_err(|_| StoreError::Unavailable("assignment lock poisoned".into()))?
            .remove(driver))
    }

    /// Vehicle currently assigned to `driver`.
    pub fn vehicle_for(&self, driver: &DriverId) -> Result<Option<String>, StoreError> {
        Ok(self
            .active
            .read()
            .map_err(|_| StoreError::Unavailable("assignment lock poisoned".into()))?
            .get(driver)
            .cloned())
    }
}

impl AssignmentPort for MemoryAssignments {
    fn has_active_assignment(&self, driver: &DriverId) -> Result<bool, StoreError> {
        Ok(self.vehicle_for(driver)?.is_some())
    }
}
