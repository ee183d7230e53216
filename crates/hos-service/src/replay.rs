// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON-lines event replay.
//!
//! Each non-blank line is one [`ReplayEvent`]:
//!
//! ```text
//! {"type":"assign","driver":"d1","vehicle":"truck-7"}
//! {"type":"status","driver":"d1","status":"ON_DUTY","odometer":1200,"timestamp":"2024-03-04T08:00:00Z"}
//! {"type":"resolve","violation":1,"notes":"reviewed"}
//! {"type":"unassign","driver":"d1"}
//! ```
//!
//! The service clock follows the newest status timestamp seen, so background
//! evaluations and resolutions happen "at" the time of the log.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use hos_core::memory::{MemoryAssignments, MemoryTimelineStore};
use hos_core::{DriverId, HosError, HoursSummary, StatusChange, Violation, ViolationId};

use crate::clock::{Clock, ManualClock};
use crate::service::ComplianceService;

/// Service type the replay runs against.
pub type MemoryService = ComplianceService<MemoryTimelineStore, MemoryAssignments>;

/// One line of a replay log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    /// Give a driver a vehicle.
    Assign {
        /// Driver.
        driver: DriverId,
        /// Vehicle identifier.
        vehicle: String,
    },
    /// End a driver's vehicle assignment.
    Unassign {
        /// Driver.
        driver: DriverId,
    },
    /// Duty-status change.
    Status(StatusChange),
    /// Resolve a violation.
    Resolve {
        /// Violation id.
        violation: ViolationId,
        /// Resolution notes.
        #[serde(default)]
        notes: Option<String>,
    },
}

/// Why a replay stopped early (strict mode) or a line was skipped.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Line is not a valid event.
    #[error("[REPLAY_PARSE] line {line}: {source}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Decoder error.
        source: serde_json::Error,
    },
    /// The engine rejected the event.
    #[error("[REPLAY_REJECTED] line {line}: {source}")]
    Rejected {
        /// 1-based line number.
        line: usize,
        /// Engine error.
        source: HosError,
    },
}

/// Final state of one driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverReport {
    /// Driver.
    pub driver: DriverId,
    /// Vehicle assigned at the end of the log.
    pub vehicle: Option<String>,
    /// Usage against every limit at the report instant.
    pub summary: HoursSummary,
    /// Every violation on file, oldest first.
    pub violations: Vec<Violation>,
}

/// Result of a full replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Report instant.
    pub as_of: DateTime<Utc>,
    /// Events applied.
    pub applied: usize,
    /// Events skipped because they failed to parse or were rejected.
    pub rejected: usize,
    /// Per-driver state, sorted by driver.
    pub drivers: Vec<DriverReport>,
}

/// Drives a [`MemoryService`] from a log.
pub struct Replayer {
    service: MemoryService,
    clock: Arc<ManualClock>,
    strict: bool,
    applied: usize,
    rejected: usize,
    seen: BTreeSet<DriverId>,
}

impl Replayer {
    /// Replayer around `service`, whose clock must be `clock`.
    pub fn new(service: MemoryService, clock: Arc<ManualClock>, strict: bool) -> Self {
        Self {
            service,
            clock,
            strict,
            applied: 0,
            rejected: 0,
            seen: BTreeSet::new(),
        }
    }

    /// Underlying service.
    pub fn service(&self) -> &MemoryService {
        &self.service
    }

    /// Apply one raw line. Blank lines and `#` comments are ignored.
    pub async fn apply_line(&mut self, line_no: usize, line: &str) -> Result<(), ReplayError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }
        let event = match serde_json::from_str::<ReplayEvent>(trimmed) {
            Ok(event) => event,
            Err(source) => {
                return self.reject(ReplayError::Parse {
                    line: line_no,
                    source,
                })
            }
        };
        match self.apply(event).await {
            Ok(()) => {
                self.applied += 1;
                Ok(())
            }
            Err(source) => self.reject(ReplayError::Rejected {
                line: line_no,
                source,
            }),
        }
    }

    fn reject(&mut self, err: ReplayError) -> Result<(), ReplayError> {
        if self.strict {
            return Err(err);
        }
        warn!(error = %err, "event skipped");
        self.rejected += 1;
        Ok(())
    }

    /// Apply one decoded event.
    pub async fn apply(&mut self, event: ReplayEvent) -> Result<(), HosError> {
        let assignments = self.service.engine().assignments();
        match event {
            ReplayEvent::Assign { driver, vehicle } => {
                self.seen.insert(driver.clone());
                assignments.assign(driver, vehicle)?;
            }
            ReplayEvent::Unassign { driver } => {
                assignments.unassign(&driver)?;
            }
            ReplayEvent::Status(change) => {
                if let Some(ts) = change.timestamp {
                    self.clock.advance_to(ts);
                }
                let driver = change.driver.clone();
                self.seen.insert(driver.clone());
                self.service.record_status_change(change).await?;
                // Keep violation ids deterministic across runs.
                self.service.settle_driver(&driver).await;
            }
            ReplayEvent::Resolve { violation, notes } => {
                self.service.resolve(violation, notes).await?;
            }
        }
        Ok(())
    }

    /// Evaluate every driver at `as_of` (default: the replay clock) and
    /// report the final state.
    pub async fn finish(self, as_of: Option<DateTime<Utc>>) -> Result<ReplayReport, HosError> {
        self.service.settle().await;
        let as_of = as_of.unwrap_or_else(|| self.clock.now());
        let assignments = self.service.engine().assignments();
        let mut drivers = Vec::with_capacity(self.seen.len());
        for driver in &self.seen {
            self.service.evaluate(driver, as_of).await?;
            drivers.push(DriverReport {
                driver: driver.clone(),
                vehicle: assignments.vehicle_for(driver)?,
                summary: self.service.hours_summary(driver, as_of).await?,
                violations: self.service.violations(driver).await?,
            });
        }
        info!(
            applied = self.applied,
            rejected = self.rejected,
            drivers = drivers.len(),
            "replay finished"
        );
        Ok(ReplayReport {
            as_of,
            applied: self.applied,
            rejected: self.rejected,
            drivers,
        })
    }
}
