//! Tests for the PresenceTracker

use super::*;
use crate::domain::geofence::tests::{sample_north, HOME_LAT, HOME_LON};
use crate::domain::types::TransitionEvent;

const RADIUS_M: f64 = 120.0;

fn home_zone() -> ZoneDefinition {
    ZoneDefinition::new(HOME_LAT, HOME_LON, RADIUS_M).unwrap()
}

fn create_test_tracker() -> PresenceTracker {
    PresenceTracker::new(home_zone())
}

fn event_at(tracker: &mut PresenceTracker, meters: f64, ts: i64) -> Option<TransitionEvent> {
    tracker.process_sample(&sample_north(meters, ts)).unwrap().map(|t| t.event)
}

#[test]
fn test_new_tracker_is_unknown() {
    let tracker = create_test_tracker();
    assert_eq!(tracker.state(), PresenceState::Unknown);
    assert_eq!(tracker.last_seen_ms(), None);
    assert_eq!(tracker.hysteresis_m(), 0.0);
}

#[test]
fn test_leave_and_return_scenario() {
    let mut tracker = create_test_tracker();

    // A: 50m -> at home
    assert_eq!(event_at(&mut tracker, 50.0, 1_000), Some(TransitionEvent::InitialHome));
    // B: same position, new row
    assert_eq!(event_at(&mut tracker, 50.0, 2_000), None);
    // C: 300m -> left
    assert_eq!(event_at(&mut tracker, 300.0, 3_000), Some(TransitionEvent::LeftHome));
    // D: unchanged
    assert_eq!(event_at(&mut tracker, 300.0, 4_000), None);
    // E: 80m -> back
    assert_eq!(event_at(&mut tracker, 80.0, 5_000), Some(TransitionEvent::BackHome));

    assert_eq!(tracker.state(), PresenceState::Home);
    assert_eq!(tracker.last_seen_ms(), Some(5_000));
}

#[test]
fn test_inside_only_emits_single_initial_home() {
    let mut tracker = create_test_tracker();
    let events: Vec<_> = (1..=200)
        .filter_map(|i| event_at(&mut tracker, (i % 100) as f64, i * 30_000))
        .collect();
    assert_eq!(events, vec![TransitionEvent::InitialHome]);
}

#[test]
fn test_initial_away() {
    let mut tracker = create_test_tracker();
    assert_eq!(event_at(&mut tracker, 5_000.0, 1), Some(TransitionEvent::InitialAway));
    assert_eq!(tracker.state(), PresenceState::Away);
    assert_eq!(event_at(&mut tracker, 4_000.0, 2), None);
    assert_eq!(event_at(&mut tracker, 10.0, 3), Some(TransitionEvent::BackHome));
}

#[test]
fn test_duplicate_timestamp_is_ignored() {
    let mut tracker = create_test_tracker();
    assert_eq!(event_at(&mut tracker, 50.0, 1_000), Some(TransitionEvent::InitialHome));

    // Same row polled again, even if the store rewrote the coordinates
    let observation = tracker.observe(&sample_north(300.0, 1_000)).unwrap();
    assert_eq!(observation, Observation::Stale { timestamp_ms: 1_000, last_seen_ms: 1_000 });
    assert_eq!(tracker.state(), PresenceState::Home);
}

#[test]
fn test_out_of_order_sample_is_ignored() {
    let mut tracker = create_test_tracker();
    event_at(&mut tracker, 50.0, 5_000);
    assert_eq!(event_at(&mut tracker, 300.0, 4_999), None);
    assert_eq!(tracker.state(), PresenceState::Home);
    assert_eq!(tracker.last_seen_ms(), Some(5_000));
}

#[test]
fn test_first_sample_accepts_any_timestamp() {
    let mut tracker = create_test_tracker();
    assert_eq!(event_at(&mut tracker, 50.0, 0), Some(TransitionEvent::InitialHome));
    assert_eq!(tracker.last_seen_ms(), Some(0));
}

#[test]
fn test_restart_never_reports_left_or_back() {
    let mut tracker = create_test_tracker();
    event_at(&mut tracker, 50.0, 1_000);
    assert_eq!(event_at(&mut tracker, 300.0, 2_000), Some(TransitionEvent::LeftHome));

    // Process restart: state is rebuilt from scratch
    let mut restarted = create_test_tracker();
    assert_eq!(event_at(&mut restarted, 300.0, 3_000), Some(TransitionEvent::InitialAway));

    let mut restarted = create_test_tracker();
    assert_eq!(event_at(&mut restarted, 50.0, 3_000), Some(TransitionEvent::InitialHome));
}

#[test]
fn test_invalid_sample_leaves_state_untouched() {
    let mut tracker = create_test_tracker();
    event_at(&mut tracker, 50.0, 1_000);

    let bad = PositionSample::new(f64::NAN, HOME_LON, 2_000);
    assert!(tracker.process_sample(&bad).is_err());
    assert_eq!(tracker.state(), PresenceState::Home);
    assert_eq!(tracker.last_seen_ms(), Some(1_000));

    // A valid sample with the same timestamp is still processed
    assert_eq!(event_at(&mut tracker, 300.0, 2_000), Some(TransitionEvent::LeftHome));
}

#[test]
fn test_transition_carries_measurement() {
    let mut tracker = create_test_tracker();
    let transition = tracker.process_sample(&sample_north(300.0, 42)).unwrap().unwrap();
    assert_eq!(transition.event, TransitionEvent::InitialAway);
    assert_eq!(transition.timestamp_ms, 42);
    assert!((transition.distance_m - 300.0).abs() < 0.01);
}

#[test]
fn test_boundary_sample_counts_as_home() {
    let sample = sample_north(RADIUS_M, 1);
    let exact = crate::domain::geofence::haversine_m(
        sample.latitude,
        sample.longitude,
        HOME_LAT,
        HOME_LON,
    );
    let mut tracker = PresenceTracker::new(ZoneDefinition::new(HOME_LAT, HOME_LON, exact).unwrap());
    let transition = tracker.process_sample(&sample).unwrap().unwrap();
    assert_eq!(transition.event, TransitionEvent::InitialHome);
}

#[test]
fn test_hysteresis_delays_exit_only() {
    let mut tracker = PresenceTracker::with_hysteresis(home_zone(), 30.0).unwrap();
    assert_eq!(tracker.hysteresis_m(), 30.0);

    assert_eq!(event_at(&mut tracker, 100.0, 1), Some(TransitionEvent::InitialHome));
    // Beyond radius but inside the margin: still home
    assert_eq!(event_at(&mut tracker, 140.0, 2), None);
    assert_eq!(event_at(&mut tracker, 149.0, 3), None);
    assert_eq!(event_at(&mut tracker, 151.0, 4), Some(TransitionEvent::LeftHome));
    // Re-entry uses the base radius
    assert_eq!(event_at(&mut tracker, 140.0, 5), None);
    assert_eq!(event_at(&mut tracker, 120.0 - 0.5, 6), Some(TransitionEvent::BackHome));
}

#[test]
fn test_hysteresis_does_not_apply_on_startup() {
    let mut tracker = PresenceTracker::with_hysteresis(home_zone(), 30.0).unwrap();
    assert_eq!(event_at(&mut tracker, 140.0, 1), Some(TransitionEvent::InitialAway));
}

#[test]
fn test_negative_hysteresis_rejected() {
    assert_eq!(
        PresenceTracker::with_hysteresis(home_zone(), -1.0).unwrap_err(),
        GeofenceError::InvalidHysteresis(-1.0)
    );
    assert!(matches!(
        PresenceTracker::with_hysteresis(home_zone(), f64::NAN),
        Err(GeofenceError::InvalidHysteresis(h)) if h.is_nan()
    ));
    let err = PresenceTracker::with_hysteresis(home_zone(), -1.0).unwrap_err();
    assert!(err.to_string().contains("hysteresis"), "{}", err);
}

#[test]
fn test_transition_table() {
    use PresenceState::*;
    assert_eq!(next_event(Unknown, true), Some(TransitionEvent::InitialHome));
    assert_eq!(next_event(Unknown, false), Some(TransitionEvent::InitialAway));
    assert_eq!(next_event(Home, false), Some(TransitionEvent::LeftHome));
    assert_eq!(next_event(Away, true), Some(TransitionEvent::BackHome));
    assert_eq!(next_event(Home, true), None);
    assert_eq!(next_event(Away, false), None);
}
