// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Async HOS compliance service.
//!
//! [`ComplianceService`] wraps the synchronous [`hos_core::ComplianceEngine`]
//! for use from a tokio runtime: per-driver serialized writes with a bounded
//! wait, background rule evaluation after every accepted change, and a
//! broadcast channel of newly recorded violations. [`replay`] drives the
//! service from a JSON-lines event log; the `hos-replay` binary wraps it.
#![forbid(unsafe_code)]

pub mod clock;
pub mod replay;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use replay::{ReplayEvent, ReplayReport, Replayer};
pub use service::{ComplianceService, DriverSummary};
