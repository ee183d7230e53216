// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hos_core::memory::{MemoryAssignments, MemoryTimelineStore};
use hos_core::{
    ComplianceEngine, DriverId, DutyInterval, DutyStatus, IntervalId, RuleConfig, StatusChange,
};

/// Engine over in-memory ports.
pub type MemEngine = ComplianceEngine<MemoryTimelineStore, MemoryAssignments>;

/// Monday 2024-03-04 00:00:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0)
        .single()
        .expect("valid epoch")
}

/// `day` days, `h` hours, and `m` minutes after [`t0`].
pub fn at(day: i64, h: i64, m: i64) -> DateTime<Utc> {
    t0() + Duration::days(day) + Duration::hours(h) + Duration::minutes(m)
}

/// Engine with the default rules and every listed driver assigned a truck.
pub fn engine_with(drivers: &[&str], rules: RuleConfig) -> MemEngine {
    let assignments = MemoryAssignments::new();
    for (i, driver) in drivers.iter().enumerate() {
        assignments
            .assign(DriverId::new(*driver), format!("truck-{i}"))
            .expect("assign");
    }
    ComplianceEngine::new(
        Arc::new(MemoryTimelineStore::new()),
        Arc::new(assignments),
        rules,
    )
}

/// Engine for driver `d1` with default rules.
pub fn engine() -> MemEngine {
    engine_with(&["d1"], RuleConfig::default())
}

/// Record `status` for `driver` effective at `when`, with a steady odometer.
pub fn record(engine: &MemEngine, driver: &str, status: DutyStatus, when: DateTime<Utc>) -> DutyInterval {
    engine
        .record_status_change(StatusChange::new(driver, status, 0).at(when), when)
        .expect("status change accepted")
}

/// Unsaved interval for seeding a store directly.
pub fn interval(
    driver: &str,
    status: DutyStatus,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> DutyInterval {
    DutyInterval {
        id: IntervalId(0),
        driver: DriverId::new(driver),
        status,
        start,
        end,
        location: String::new(),
        odometer_start: 0,
        notes: None,
        geo: None,
    }
}
