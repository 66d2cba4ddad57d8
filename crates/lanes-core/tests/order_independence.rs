//! Property: the physical order of lines in `status.events.jsonl` never
//! changes the derived state.
//!
//! Git merges of independent worktrees interleave appended lines
//! arbitrarily. For every permutation of a log's lines, replay must yield
//! the same lane per WP as replaying the lines sorted by event id.

use chrono::{TimeZone, Utc};
use lanes_core::event::{DEFAULT_EXECUTION_MODE, Event, EventId};
use lanes_core::lane::Lane;
use lanes_core::reducer::{self, current_lane};
use lanes_core::store;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

fn arb_lane() -> impl Strategy<Value = Lane> {
    prop::sample::select(Lane::ALL.to_vec())
}

/// Events with strictly increasing ids over a handful of WPs.
fn arb_log() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec((0_usize..4, arb_lane(), any::<u64>()), 1..24).prop_map(|steps| {
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (wp, to_lane, entropy))| {
                let millis = 1_760_000_000_000 + (i as u64) * 1_000;
                Event {
                    event_id: EventId::from_parts(millis, u128::from(entropy)),
                    feature_slug: "001-merge".into(),
                    wp_id: format!("WP0{}", wp + 1),
                    from_lane: Lane::Planned,
                    to_lane,
                    at: Utc
                        .timestamp_millis_opt(i64::try_from(millis).unwrap_or_default())
                        .single()
                        .unwrap_or_default(),
                    actor: format!("agent-{}", wp % 2),
                    force: i % 5 == 0,
                    execution_mode: DEFAULT_EXECUTION_MODE.into(),
                    reason: None,
                    review_ref: None,
                    evidence: None,
                }
            })
            .collect()
    })
}

fn arb_log_and_permutation() -> impl Strategy<Value = (Vec<Event>, Vec<Event>)> {
    arb_log().prop_flat_map(|log| {
        let shuffled = Just(log.clone()).prop_shuffle();
        (Just(log), shuffled)
    })
}

fn write_lines(dir: &std::path::Path, events: &[Event]) {
    let body: String = events
        .iter()
        .map(|e| e.to_json_line().expect("serialize"))
        .collect();
    fs::write(store::events_path(dir), body).expect("write log");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn any_line_permutation_reduces_identically((sorted, shuffled) in arb_log_and_permutation()) {
        let tmp = TempDir::new().expect("tempdir");
        write_lines(tmp.path(), &shuffled);

        let from_disk = store::read_all(tmp.path()).expect("read");
        prop_assert_eq!(&from_disk, &shuffled);

        let at = Utc::now();
        let expected = reducer::reduce("001-merge", &sorted, at);
        let actual = reducer::reduce("001-merge", &from_disk, at);
        prop_assert_eq!(&actual, &expected);

        for (wp_id, state) in &expected.work_packages {
            let winner = sorted.iter().rev().find(|e| &e.wp_id == wp_id).expect("wp has events");
            prop_assert_eq!(state.lane, winner.to_lane);
            prop_assert_eq!(current_lane(&from_disk, wp_id), winner.to_lane);
        }
    }

    #[test]
    fn materialized_file_is_byte_stable_across_permutations((sorted, shuffled) in arb_log_and_permutation()) {
        let a = TempDir::new().expect("tempdir");
        let b = TempDir::new().expect("tempdir");
        write_lines(a.path(), &sorted);
        write_lines(b.path(), &shuffled);

        let at = Utc.timestamp_opt(1_760_000_000, 0).single().expect("ts");
        let left = reducer::materialize_at(a.path(), at).expect("materialize a");
        let right = reducer::materialize_at(b.path(), at).expect("materialize b");

        prop_assert_eq!(left.work_packages, right.work_packages);
        prop_assert_eq!(left.summary, right.summary);
        prop_assert_eq!(left.last_event_id, right.last_event_id);
    }
}

#[test]
fn merge_that_reverses_two_lines_still_picks_the_later_event() {
    let tmp = TempDir::new().expect("tempdir");
    let claim = Event {
        event_id: EventId::from_parts(1_760_000_000_000, 1),
        feature_slug: "001-merge".into(),
        wp_id: "WP01".into(),
        from_lane: Lane::Planned,
        to_lane: Lane::Claimed,
        at: Utc::now(),
        actor: "a1".into(),
        force: false,
        execution_mode: DEFAULT_EXECUTION_MODE.into(),
        reason: None,
        review_ref: None,
        evidence: None,
    };
    let start = Event {
        event_id: EventId::from_parts(1_760_000_005_000, 1),
        from_lane: Lane::Claimed,
        to_lane: Lane::InProgress,
        ..claim.clone()
    };

    // The later event lands on the first line.
    write_lines(tmp.path(), &[start, claim]);

    let snapshot = reducer::materialize(tmp.path()).expect("materialize");
    assert_eq!(snapshot.lane_of("WP01"), Lane::InProgress);
}
