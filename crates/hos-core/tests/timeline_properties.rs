// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Timeline invariants under arbitrary sequences of status changes.

mod common;

use chrono::{DateTime, Duration, Utc};
use common::{engine, t0, MemEngine};
use hos_core::interval::check_timeline;
use hos_core::{DriverId, DutyStatus, HosError, StatusChange, StatusSet};
use proptest::prelude::*;

/// One attempted change: which successor to pick, and how long after the
/// previous attempt it lands (may be zero or negative).
#[derive(Debug, Clone)]
struct Step {
    pick: usize,
    offset_secs: i64,
}

fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        (0usize..4, -600i64..20_000).prop_map(|(pick, offset_secs)| Step { pick, offset_secs }),
        1..40,
    )
}

/// Replay `steps`, returning the final clock. Rejections are checked to be
/// the user-correctable kind and to leave the timeline untouched.
fn replay(engine: &MemEngine, steps: &[Step]) -> DateTime<Utc> {
    let driver = DriverId::new("d1");
    let mut clock = t0();
    let mut current: Option<DutyStatus> = None;
    for step in steps {
        clock += Duration::seconds(step.offset_secs);
        let status = match current {
            None => DutyStatus::ALL[step.pick % DutyStatus::ALL.len()],
            Some(from) => from.successors()[step.pick % from.successors().len()],
        };
        let before = engine.store().timeline(&driver).unwrap();
        match engine.record_status_change(StatusChange::new("d1", status, 0).at(clock), clock) {
            Ok(_) => current = Some(status),
            Err(err) => {
                assert!(matches!(err, HosError::NonMonotonicTimestamp { .. }), "{err}");
                assert_eq!(engine.store().timeline(&driver).unwrap(), before);
            }
        }
    }
    clock
}

proptest! {
    #[test]
    fn intervals_never_overlap_and_only_last_is_open(steps in steps()) {
        let engine = engine();
        replay(&engine, &steps);
        let timeline = engine.store().timeline(&DriverId::new("d1")).unwrap();

        prop_assert!(check_timeline(&timeline).is_ok());
        let open = timeline.iter().filter(|iv| iv.is_open()).count();
        prop_assert!(open <= 1);
        if let Some(last) = timeline.last() {
            prop_assert!(last.is_open());
        }
        for pair in timeline.windows(2) {
            prop_assert_eq!(pair[0].end, Some(pair[1].start));
            prop_assert!(pair[0].status.can_transition_to(pair[1].status));
        }
    }

    #[test]
    fn accumulation_is_additive_over_adjacent_windows(
        steps in steps(),
        cut_a in 0.0f64..1.0,
        cut_b in 0.0f64..1.0,
        tail_secs in 0i64..50_000,
    ) {
        let engine = engine();
        let clock = replay(&engine, &steps);
        let driver = DriverId::new("d1");

        let start = t0() - Duration::hours(1);
        let end = clock.max(t0()) + Duration::seconds(tail_secs);
        let span = (end - start).num_seconds();
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let cut = |f: f64| start + Duration::seconds((span as f64 * f) as i64);
        let (lo, hi) = if cut_a <= cut_b { (cut(cut_a), cut(cut_b)) } else { (cut(cut_b), cut(cut_a)) };

        for filter in [StatusSet::DRIVING_ONLY, StatusSet::ON_DUTY, StatusSet::REST, StatusSet::ALL] {
            let whole = engine.accumulate(&driver, filter, start, end, end).unwrap().total_secs;
            let a = engine.accumulate(&driver, filter, start, lo, end).unwrap().total_secs;
            let b = engine.accumulate(&driver, filter, lo, hi, end).unwrap().total_secs;
            let c = engine.accumulate(&driver, filter, hi, end, end).unwrap().total_secs;
            prop_assert_eq!(whole, a + b + c);

            let by_day = engine.accumulate_by_day(&driver, filter, start, end, end).unwrap();
            prop_assert_eq!(by_day.total_secs, whole);
        }
    }

    #[test]
    fn all_statuses_cover_the_recorded_span(steps in steps()) {
        let engine = engine();
        let clock = replay(&engine, &steps);
        let driver = DriverId::new("d1");
        let timeline = engine.store().timeline(&driver).unwrap();
        if let Some(first) = timeline.first() {
            let end = clock.max(first.start);
            let covered = engine
                .accumulate(&driver, StatusSet::ALL, first.start, end, end)
                .unwrap()
                .total_secs;
            prop_assert_eq!(covered, (end - first.start).num_seconds());
        }
    }

    #[test]
    fn evaluation_is_idempotent(steps in steps(), extra_secs in 0i64..200_000) {
        let engine = engine();
        let clock = replay(&engine, &steps);
        let driver = DriverId::new("d1");
        let as_of = clock.max(t0()) + Duration::seconds(extra_secs);

        let first = engine.evaluate(&driver, as_of).unwrap();
        let second = engine.evaluate(&driver, as_of).unwrap();
        prop_assert!(second.is_empty());
        prop_assert_eq!(engine.unresolved_violations(&driver).unwrap().len(), first.len());
    }
}
