// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]
//! End-to-end duty-day scenarios through the engine façade.

mod common;

use chrono::Duration;
use common::{at, engine, interval, record};
use hos_core::{DriverId, DutyStatus, HosError, StatusChange, ViolationKind};

fn d1() -> DriverId {
    DriverId::new("d1")
}

#[test]
fn drive_time_exceeded_after_eleven_hours_behind_the_wheel() {
    let engine = engine();
    record(&engine, "d1", DutyStatus::OffDuty, at(0, 0, 0));
    // OFF_DUTY cannot go straight to DRIVING: one-second pre-trip.
    record(&engine, "d1", DutyStatus::OnDuty, at(0, 8, 0));
    record(
        &engine,
        "d1",
        DutyStatus::Driving,
        at(0, 8, 0) + Duration::seconds(1),
    );

    assert!(engine.evaluate(&d1(), at(0, 18, 59)).unwrap().is_empty());
    let raised = engine.evaluate(&d1(), at(0, 19, 5)).unwrap();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].kind, ViolationKind::DriveTimeExceeded);
    assert!(raised[0].observed_secs > 11 * 3600);
}

#[test]
fn drive_time_exceeded_on_seeded_timeline() {
    let engine = engine();
    engine
        .store()
        .seed(vec![
            interval("d1", DutyStatus::OffDuty, at(0, 0, 0), Some(at(0, 8, 0))),
            interval("d1", DutyStatus::Driving, at(0, 8, 0), None),
        ])
        .unwrap();

    let raised = engine.evaluate(&d1(), at(0, 19, 5)).unwrap();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].kind, ViolationKind::DriveTimeExceeded);
    assert_eq!(raised[0].observed_secs, 11 * 3600 + 5 * 60);
    assert!(engine.evaluate(&d1(), at(0, 19, 5)).unwrap().is_empty());
}

#[test]
fn ten_hour_rest_starts_a_fresh_duty_period() {
    let engine = engine();
    record(&engine, "d1", DutyStatus::OnDuty, at(0, 8, 0));
    record(&engine, "d1", DutyStatus::Driving, at(0, 9, 0));
    record(&engine, "d1", DutyStatus::OffDuty, at(0, 20, 0));
    record(&engine, "d1", DutyStatus::Sleeper, at(0, 23, 0));
    // Exactly 10h00m00s of rest ends at 06:00.
    record(&engine, "d1", DutyStatus::OnDuty, at(1, 6, 0));
    record(&engine, "d1", DutyStatus::Driving, at(1, 6, 15));

    assert_eq!(
        engine.duty_period_start(&d1(), at(1, 6, 15)).unwrap(),
        Some(at(1, 6, 0))
    );
    let summary = engine.hours_summary(&d1(), at(1, 6, 15)).unwrap();
    assert_eq!(summary.drive_secs_remaining, 11 * 3600);

    // Yesterday's 11h of driving does not count against today.
    assert!(engine.evaluate(&d1(), at(1, 17, 0)).unwrap().is_empty());
    let summary = engine.hours_summary(&d1(), at(1, 17, 0)).unwrap();
    assert_eq!(summary.drive_secs_used, 10 * 3600 + 45 * 60);
}

#[test]
fn odometer_regression_leaves_open_interval_in_place() {
    let engine = engine();
    engine
        .record_status_change(
            StatusChange::new("d1", DutyStatus::OnDuty, 120_400).at(at(0, 6, 0)),
            at(0, 6, 0),
        )
        .unwrap();
    let before = engine.timeline(&d1(), at(0, 0, 0), at(0, 12, 0)).unwrap();

    let err = engine
        .record_status_change(
            StatusChange::new("d1", DutyStatus::Driving, 120_399).at(at(0, 7, 0)),
            at(0, 7, 0),
        )
        .unwrap_err();
    assert_eq!(
        err,
        HosError::OdometerRegression {
            last: 120_400,
            requested: 120_399
        }
    );

    let after = engine.timeline(&d1(), at(0, 0, 0), at(0, 12, 0)).unwrap();
    assert_eq!(after, before);
    assert_eq!(after.len(), 1);
    assert!(after[0].is_open());
}

#[test]
fn resolving_twice_is_rejected() {
    let engine = engine();
    engine
        .store()
        .seed(vec![interval("d1", DutyStatus::Driving, at(0, 6, 0), None)])
        .unwrap();
    let raised = engine.evaluate(&d1(), at(0, 18, 0)).unwrap();
    let id = raised[0].id;

    let resolved = engine.resolve(id, Some("logged".into()), at(0, 18, 30)).unwrap();
    assert!(resolved.resolved);
    assert_eq!(
        engine.resolve(id, None, at(0, 18, 45)),
        Err(HosError::AlreadyResolved(id))
    );
}

#[test]
fn thirty_five_hour_rest_restarts_the_cycle() {
    let engine = engine();
    // Four 13h on-duty days.
    for day in 0..4 {
        record(&engine, "d1", DutyStatus::OnDuty, at(day, 6, 0));
        record(&engine, "d1", DutyStatus::Driving, at(day, 7, 0));
        record(&engine, "d1", DutyStatus::OffDuty, at(day, 19, 0));
    }
    let before = engine.current_cycle(&d1(), at(3, 19, 0)).unwrap();
    assert_eq!(before.cycle_secs_used, 4 * 13 * 3600);
    assert_eq!(before.current_cycle_day, 4);

    // 35h: OFF_DUTY then SLEEPER from day 3 19:00 to day 5 06:00.
    record(&engine, "d1", DutyStatus::Sleeper, at(3, 23, 0));
    record(&engine, "d1", DutyStatus::OnDuty, at(5, 6, 0));
    record(
        &engine,
        "d1",
        DutyStatus::Driving,
        at(5, 6, 0) + Duration::seconds(1),
    );

    let reset = engine.current_cycle(&d1(), at(5, 6, 0)).unwrap();
    assert_eq!(reset.last_reset, Some(at(5, 6, 0)));
    assert_eq!(reset.cycle_secs_used, 0);

    let later = engine.current_cycle(&d1(), at(5, 7, 0)).unwrap();
    assert_eq!(later.cycle_secs_used, 3600);
    assert_eq!(later.current_cycle_day, 1);
}

#[test]
fn thirty_five_hour_rest_restarts_seeded_cycle() {
    let engine = engine();
    engine
        .store()
        .seed(vec![
            interval("d1", DutyStatus::Driving, at(0, 6, 0), Some(at(0, 17, 0))),
            interval("d1", DutyStatus::OffDuty, at(0, 17, 0), Some(at(1, 2, 0))),
            interval("d1", DutyStatus::Sleeper, at(1, 2, 0), Some(at(2, 4, 0))),
            interval("d1", DutyStatus::Driving, at(2, 4, 0), None),
        ])
        .unwrap();
    let state = engine.current_cycle(&d1(), at(2, 4, 0)).unwrap();
    assert_eq!(state.last_reset, Some(at(2, 4, 0)));
    assert_eq!(state.cycle_secs_used, 0);
}

#[test]
fn thirty_three_hours_is_not_a_restart() {
    let engine = engine();
    engine
        .store()
        .seed(vec![
            interval("d1", DutyStatus::Driving, at(0, 6, 0), Some(at(0, 17, 0))),
            interval("d1", DutyStatus::OffDuty, at(0, 17, 0), Some(at(2, 2, 0))),
            interval("d1", DutyStatus::Driving, at(2, 2, 0), None),
        ])
        .unwrap();
    let state = engine.current_cycle(&d1(), at(2, 3, 0)).unwrap();
    assert_eq!(state.last_reset, None);
    assert_eq!(state.cycle_secs_used, 12 * 3600);
}
