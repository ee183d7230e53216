// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Async compliance service.
//!
//! # Concurrency
//!
//! Writes for one driver are serialized through that driver's slot: a
//! `tokio::sync::Mutex` kept in a `DashMap`. Different drivers never share a
//! slot. Waiting for a slot, and for the driver's previous background
//! evaluation, is bounded by [`ServiceConfig::commit_timeout`]; when the bound
//! is hit the change is rejected with [`HosError::StorageUnavailable`] before
//! anything is written.
//!
//! Every accepted change schedules a rule evaluation on the blocking pool.
//! Its handle is parked in the slot, so the driver's next write waits for it.
//! Violations it records go to every [`ComplianceService::subscribe`] receiver.
//! An evaluation that fails is remembered in the slot and re-run at the same
//! instant before the driver's next change is committed; while it keeps
//! failing, changes are rejected with [`HosError::StorageUnavailable`].
//!
//! The commit itself runs inline on the calling task and is not covered by the
//! timeout. A store doing network I/O must enforce its own deadline and report
//! it as [`hos_core::StoreError::Unavailable`].
//!
//! Reads never take a slot; they run on the blocking pool. The store commits
//! atomically, so a read sees the timeline either before or after any change.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, warn};

use hos_core::{
    AssignmentPort, ComplianceEngine, CycleState, DriverId, DutyInterval, HosError, HoursSummary,
    HoursWindow, ServiceConfig, StatusChange, StatusSet, TimelineStore, Violation, ViolationId,
};

use crate::clock::{Clock, SystemClock};

struct PendingEvaluation {
    as_of: DateTime<Utc>,
    handle: JoinHandle<Result<(), HosError>>,
}

#[derive(Default)]
struct DriverSlot {
    pending: Option<PendingEvaluation>,
    /// Instant of a failed evaluation that must succeed before the next commit.
    retry: Option<DateTime<Utc>>,
}

impl DriverSlot {
    fn absorb(
        &mut self,
        driver: &DriverId,
        as_of: DateTime<Utc>,
        joined: Result<Result<(), HosError>, JoinError>,
    ) {
        let error = match joined {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(err) => err.to_string(),
        };
        warn!(driver = %driver, as_of = %as_of, error = %error, "background evaluation failed");
        self.retry = Some(as_of);
    }
}

/// One driver's row in a fleet summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverSummary {
    /// Driver.
    pub driver: DriverId,
    /// Usage against every limit.
    pub summary: HoursSummary,
}

/// Async façade over [`ComplianceEngine`].
pub struct ComplianceService<S: ?Sized, A: ?Sized> {
    engine: ComplianceEngine<S, A>,
    slots: DashMap<DriverId, Arc<Mutex<DriverSlot>>>,
    notifier: broadcast::Sender<Violation>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl<S, A> ComplianceService<S, A>
where
    S: TimelineStore + ?Sized + 'static,
    A: AssignmentPort + ?Sized + 'static,
{
    /// Service on the system clock.
    pub fn new(engine: ComplianceEngine<S, A>, config: ServiceConfig) -> Self {
        Self::with_clock(engine, config, Arc::new(SystemClock))
    }

    /// Service on an injected clock.
    pub fn with_clock(
        engine: ComplianceEngine<S, A>,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (notifier, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            engine,
            slots: DashMap::new(),
            notifier,
            clock,
            config,
        }
    }

    /// Underlying synchronous engine.
    pub fn engine(&self) -> &ComplianceEngine<S, A> {
        &self.engine
    }

    /// Service clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Receive every violation recorded from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Violation> {
        self.notifier.subscribe()
    }

    fn slot(&self, driver: &DriverId) -> Arc<Mutex<DriverSlot>> {
        Arc::clone(self.slots.entry(driver.clone()).or_default().value())
    }

    fn timed_out(&self, driver: &DriverId, waiting_for: &str) -> HosError {
        warn!(
            driver = %driver,
            timeout_ms = self.config.commit_timeout_ms,
            waiting_for,
            "status change timed out"
        );
        HosError::StorageUnavailable(format!(
            "timed out after {}ms waiting for {waiting_for} of driver {driver}",
            self.config.commit_timeout_ms
        ))
    }

    /// Record a status change for its driver and schedule evaluation.
    ///
    /// A missing `timestamp` takes the service clock.
    pub async fn record_status_change(&self, change: StatusChange) -> Result<DutyInterval, HosError> {
        let driver = change.driver.clone();
        let bound = self.commit_timeout();
        let started = Instant::now();

        // Unknown drivers never get a slot.
        if !self.engine.assignments().has_active_assignment(&driver)? {
            return Err(HosError::NoActiveAssignment(driver));
        }

        let slot = self.slot(&driver);
        let Ok(mut guard) = timeout(bound, slot.lock_owned()).await else {
            return Err(self.timed_out(&driver, "write slot"));
        };

        if let Some(mut pending) = guard.pending.take() {
            let remaining = bound.saturating_sub(started.elapsed());
            let waited = timeout(remaining, &mut pending.handle).await;
            match waited {
                Ok(joined) => guard.absorb(&driver, pending.as_of, joined),
                Err(_) => {
                    guard.pending = Some(pending);
                    return Err(self.timed_out(&driver, "previous evaluation"));
                }
            }
        }

        if let Some(as_of) = guard.retry {
            let remaining = bound.saturating_sub(started.elapsed());
            let retried = timeout(remaining, self.evaluate(&driver, as_of)).await;
            match retried {
                Ok(Ok(_)) => guard.retry = None,
                Ok(Err(err)) => {
                    warn!(driver = %driver, as_of = %as_of, error = %err, "evaluation retry failed");
                    return Err(if err.is_retryable() {
                        err
                    } else {
                        HosError::StorageUnavailable(err.to_string())
                    });
                }
                Err(_) => return Err(self.timed_out(&driver, "evaluation retry")),
            }
        }

        let now = self.clock.now();
        let committed = self.engine.record_status_change(change, now)?;
        guard.pending = Some(self.spawn_evaluation(driver, now));
        Ok(committed)
    }

    fn spawn_evaluation(&self, driver: DriverId, as_of: DateTime<Utc>) -> PendingEvaluation {
        let engine = self.engine.clone();
        let notifier = self.notifier.clone();
        let handle = tokio::task::spawn_blocking(move || -> Result<(), HosError> {
            publish(&notifier, engine.evaluate(&driver, as_of)?);
            Ok(())
        });
        PendingEvaluation { as_of, handle }
    }

    /// Wait for the driver's background evaluation, if one is running.
    pub async fn settle_driver(&self, driver: &DriverId) {
        let Some(slot) = self.slots.get(driver).map(|s| Arc::clone(s.value())) else {
            return;
        };
        let mut guard = slot.lock().await;
        if let Some(pending) = guard.pending.take() {
            let joined = pending.handle.await;
            guard.absorb(driver, pending.as_of, joined);
        }
    }

    /// Wait for every background evaluation started so far.
    pub async fn settle(&self) {
        let drivers: Vec<DriverId> = self.slots.iter().map(|e| e.key().clone()).collect();
        for driver in drivers {
            self.settle_driver(&driver).await;
        }
    }

    /// Run a synchronous engine call on the blocking pool.
    async fn read<T, F>(&self, op: F) -> Result<T, HosError>
    where
        F: FnOnce(&ComplianceEngine<S, A>) -> Result<T, HosError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || op(&engine))
            .await
            .map_err(|err| HosError::StorageUnavailable(format!("engine task failed: {err}")))?
    }

    /// Evaluate `driver` at `as_of`, record and publish new violations.
    pub async fn evaluate(&self, driver: &DriverId, as_of: DateTime<Utc>) -> Result<Vec<Violation>, HosError> {
        let driver = driver.clone();
        let raised = self.read(move |engine| engine.evaluate(&driver, as_of)).await?;
        publish(&self.notifier, raised.clone());
        Ok(raised)
    }

    /// See [`ComplianceEngine::hours_summary`].
    pub async fn hours_summary(&self, driver: &DriverId, as_of: DateTime<Utc>) -> Result<HoursSummary, HosError> {
        let driver = driver.clone();
        self.read(move |engine| engine.hours_summary(&driver, as_of)).await
    }

    /// See [`ComplianceEngine::current_cycle`].
    pub async fn current_cycle(&self, driver: &DriverId, as_of: DateTime<Utc>) -> Result<CycleState, HosError> {
        let driver = driver.clone();
        self.read(move |engine| engine.current_cycle(&driver, as_of)).await
    }

    /// See [`ComplianceEngine::accumulate`].
    pub async fn accumulate(
        &self,
        driver: &DriverId,
        filter: StatusSet,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<HoursWindow, HosError> {
        let driver = driver.clone();
        self.read(move |engine| engine.accumulate(&driver, filter, window_start, window_end, as_of))
            .await
    }

    /// See [`ComplianceEngine::timeline`].
    pub async fn timeline(
        &self,
        driver: &DriverId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DutyInterval>, HosError> {
        let driver = driver.clone();
        self.read(move |engine| engine.timeline(&driver, from, to)).await
    }

    /// Summaries for `drivers` at `as_of`, in input order.
    ///
    /// Computed one driver at a time, yielding to the runtime in between.
    /// Dropping the future cancels the remaining work and discards what was
    /// computed.
    pub async fn fleet_summary(
        &self,
        drivers: &[DriverId],
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DriverSummary>, HosError> {
        let mut rows = Vec::with_capacity(drivers.len());
        for driver in drivers {
            rows.push(DriverSummary {
                driver: driver.clone(),
                summary: self.hours_summary(driver, as_of).await?,
            });
            tokio::task::yield_now().await;
        }
        Ok(rows)
    }

    /// Resolve a violation at the service clock's current time.
    pub async fn resolve(&self, id: ViolationId, notes: Option<String>) -> Result<Violation, HosError> {
        let now = self.clock.now();
        self.read(move |engine| engine.resolve(id, notes, now)).await
    }

    /// See [`ComplianceEngine::violation`].
    pub async fn violation(&self, id: ViolationId) -> Result<Violation, HosError> {
        self.read(move |engine| engine.violation(id)).await
    }

    /// See [`ComplianceEngine::unresolved_violations`].
    pub async fn unresolved_violations(&self, driver: &DriverId) -> Result<Vec<Violation>, HosError> {
        let driver = driver.clone();
        self.read(move |engine| engine.unresolved_violations(&driver)).await
    }

    /// See [`ComplianceEngine::violations`].
    pub async fn violations(&self, driver: &DriverId) -> Result<Vec<Violation>, HosError> {
        let driver = driver.clone();
        self.read(move |engine| engine.violations(&driver)).await
    }

    /// Bound applied to slot and evaluation waits.
    pub fn commit_timeout(&self) -> Duration {
        self.config.commit_timeout()
    }
}

fn publish(notifier: &broadcast::Sender<Violation>, raised: Vec<Violation>) {
    for violation in raised {
        let id = violation.id;
        if notifier.send(violation).is_err() {
            debug!(id = %id, "no violation subscribers");
        }
    }
}
