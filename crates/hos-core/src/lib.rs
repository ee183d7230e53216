// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hours-of-Service compliance engine.
//!
//! Tracks each driver's duty-status history as a non-overlapping timeline of
//! [`DutyInterval`]s, derives rolling-window hour totals from it, and detects
//! limit breaches and 34-hour restarts.
//!
//! The crate is synchronous and performs no I/O. Storage sits behind the
//! [`TimelineStore`] and [`AssignmentPort`] traits; [`memory`] provides
//! in-memory implementations.
//!
//! ```text
//! StatusChange ─▶ Ledger ─▶ TimelineStore ─▶ DriverSnapshot ─▶ RuleEngine ─▶ ViolationStore
//!                                  │
//!                                  └──▶ HoursAccumulator / CycleTracker (queries)
//! ```
#![forbid(unsafe_code)]

pub mod accumulate;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod interval;
pub mod ledger;
pub mod memory;
pub mod rules;
pub mod status;
pub mod store;
pub mod violation;

pub use accumulate::{accumulate, accumulate_by_day, HoursAccumulator, HoursWindow};
pub use config::{CycleRule, HosConfig, RuleConfig, ServiceConfig};
pub use cycle::{CycleState, CycleTracker, DriverSnapshot, RestSpan};
pub use engine::ComplianceEngine;
pub use error::HosError;
pub use interval::{DriverId, DutyInterval, GeoFix, IntervalId};
pub use ledger::{Ledger, StatusChange};
pub use rules::{HoursSummary, RuleEngine};
pub use status::{DutyStatus, StatusSet};
pub use store::{AssignmentPort, StoreError, TimelineStore};
pub use violation::{Severity, Violation, ViolationDraft, ViolationId, ViolationKind, ViolationStore};
