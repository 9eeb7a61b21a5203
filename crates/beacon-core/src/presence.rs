//! Per-beacon presence state machines.
//!
//! The tracker owns one hysteresis state machine per known identity and
//! turns raw sightings into debounced range transitions. Distinct inside
//! and outside verification thresholds bias toward fast arrival detection
//! and slow, debounced departure detection, so a single dropped cycle does
//! not flap a beacon out of range.
//!
//! The tracker performs no I/O. It returns transition events; dispatching
//! them to the trigger adapter is the caller's distinct step.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{Beacon, BeaconFamily};
use crate::config::BeaconSettings;
use crate::types::BeaconIdentity;

/// Verified presence state of a beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceState {
    /// Never verified either way; the initial state.
    Unknown,
    /// Verified in range.
    Inside,
    /// Verified out of range.
    Outside,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Inside => "inside",
            Self::Outside => "outside",
        };
        f.write_str(name)
    }
}

/// A debounced presence transition.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    /// Unique id for this event instance.
    pub event_id: Uuid,

    /// Identity of the beacon that transitioned.
    pub identity: BeaconIdentity,

    /// Hardware family of the beacon.
    pub family: BeaconFamily,

    /// State before the transition.
    pub previous: PresenceState,

    /// State after the transition.
    pub current: PresenceState,

    /// When the transition was verified.
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    /// Whether this event marks the beacon entering range.
    #[must_use]
    pub fn entered(&self) -> bool {
        self.current == PresenceState::Inside
    }

    /// Whether this event marks the beacon exiting range.
    #[must_use]
    pub fn exited(&self) -> bool {
        self.current == PresenceState::Outside
    }
}

/// Presence state held for one known identity.
///
/// Invariant: the inside and outside counters are never simultaneously
/// positive. Every sighting or absence increments exactly one counter and
/// resets the other to zero. Counters clamp at their thresholds.
#[derive(Debug, Clone)]
pub struct BeaconPresenceState {
    /// Identity this state belongs to.
    pub identity: BeaconIdentity,

    /// Family recorded at first sighting.
    pub family: BeaconFamily,

    /// Current verified state.
    pub state: PresenceState,

    /// When the beacon was last sighted, if ever.
    pub last_seen_at: Option<DateTime<Utc>>,

    inside_counter: u32,
    outside_counter: u32,
}

impl BeaconPresenceState {
    fn new(identity: BeaconIdentity, family: BeaconFamily) -> Self {
        Self {
            identity,
            family,
            state: PresenceState::Unknown,
            last_seen_at: None,
            inside_counter: 0,
            outside_counter: 0,
        }
    }

    /// Consecutive sighting count, clamped at the inside threshold.
    #[must_use]
    pub fn inside_counter(&self) -> u32 {
        self.inside_counter
    }

    /// Consecutive absence count, clamped at the outside threshold.
    #[must_use]
    pub fn outside_counter(&self) -> u32 {
        self.outside_counter
    }
}

/// Owns the per-identity state machines and applies the verification
/// thresholds.
#[derive(Debug)]
pub struct PresenceTracker {
    states: HashMap<BeaconIdentity, BeaconPresenceState>,
    inside_threshold: u32,
    outside_threshold: u32,
}

impl PresenceTracker {
    /// Create a tracker with explicit verification thresholds.
    #[must_use]
    pub fn new(inside_threshold: u32, outside_threshold: u32) -> Self {
        Self {
            states: HashMap::new(),
            inside_threshold: inside_threshold.max(1),
            outside_threshold: outside_threshold.max(1),
        }
    }

    /// Create a tracker from a settings snapshot.
    #[must_use]
    pub fn from_settings(settings: &BeaconSettings) -> Self {
        Self::new(
            settings.verification_amount_inside,
            settings.verification_amount_outside,
        )
    }

    /// Refresh the verification thresholds; takes effect on the next call.
    pub fn set_thresholds(&mut self, inside: u32, outside: u32) {
        self.inside_threshold = inside.max(1);
        self.outside_threshold = outside.max(1);
    }

    /// Record one classified sighting for this cycle.
    ///
    /// Creates state (Unknown) on first sighting of a new identity.
    /// Returns the `entered` transition once the inside threshold is
    /// reached, and never again while the beacon stays inside.
    pub fn observe(&mut self, beacon: &Beacon, now: DateTime<Utc>) -> Option<TransitionEvent> {
        let state = self
            .states
            .entry(beacon.identity.clone())
            .or_insert_with(|| BeaconPresenceState::new(beacon.identity.clone(), beacon.family));

        state.inside_counter = (state.inside_counter + 1).min(self.inside_threshold);
        state.outside_counter = 0;
        state.last_seen_at = Some(now);

        if state.inside_counter >= self.inside_threshold && state.state != PresenceState::Inside {
            let previous = state.state;
            state.state = PresenceState::Inside;
            return Some(transition(state, previous, now));
        }

        None
    }

    /// Record one cycle's absence for a previously-known identity.
    ///
    /// Unknown identities are ignored; absence of something never sighted
    /// carries no information. Returns the `exited` transition once the
    /// outside threshold is reached, exactly once.
    pub fn on_missing_cycle(
        &mut self,
        identity: &BeaconIdentity,
        now: DateTime<Utc>,
    ) -> Option<TransitionEvent> {
        let state = self.states.get_mut(identity)?;

        state.outside_counter = (state.outside_counter + 1).min(self.outside_threshold);
        state.inside_counter = 0;

        if state.outside_counter >= self.outside_threshold && state.state != PresenceState::Outside
        {
            let previous = state.state;
            state.state = PresenceState::Outside;
            return Some(transition(state, previous, now));
        }

        None
    }

    /// All identities currently tracked.
    #[must_use]
    pub fn known_identities(&self) -> Vec<BeaconIdentity> {
        self.states.keys().cloned().collect()
    }

    /// Presence state for one identity, if tracked.
    #[must_use]
    pub fn state(&self, identity: &BeaconIdentity) -> Option<&BeaconPresenceState> {
        self.states.get(identity)
    }

    /// Drop the state for an identity whose owning device was removed.
    ///
    /// Returns `true` if state existed.
    pub fn remove(&mut self, identity: &BeaconIdentity) -> bool {
        self.states.remove(identity).is_some()
    }
}

fn transition(
    state: &BeaconPresenceState,
    previous: PresenceState,
    now: DateTime<Utc>,
) -> TransitionEvent {
    TransitionEvent {
        event_id: Uuid::new_v4(),
        identity: state.identity.clone(),
        family: state.family,
        previous,
        current: state.state,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BeaconFields;

    fn beacon(identity: &str) -> Beacon {
        Beacon {
            identity: BeaconIdentity::parse(identity).unwrap(),
            family: BeaconFamily::IBeacon,
            fields: BeaconFields::IBeacon {
                proximity_uuid: Uuid::nil(),
                major: 1,
                minor: 1,
                tx_power: -59,
            },
            rssi: Some(-60),
            local_name: "test beacon".into(),
        }
    }

    fn identity(s: &str) -> BeaconIdentity {
        BeaconIdentity::parse(s).unwrap()
    }

    fn assert_counters_exclusive(tracker: &PresenceTracker, id: &BeaconIdentity) {
        let state = tracker.state(id).unwrap();
        assert!(
            state.inside_counter() == 0 || state.outside_counter() == 0,
            "counters simultaneously positive: inside={} outside={}",
            state.inside_counter(),
            state.outside_counter()
        );
    }

    #[test]
    fn counters_are_never_simultaneously_positive() {
        let mut tracker = PresenceTracker::new(3, 4);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let id = b.identity.clone();
        let now = Utc::now();

        // Arbitrary interleaving of sightings and absences.
        for step in [true, true, false, true, false, false, false, true, false] {
            if step {
                tracker.observe(&b, now);
            } else {
                tracker.on_missing_cycle(&id, now);
            }
            assert_counters_exclusive(&tracker, &id);
        }
    }

    #[test]
    fn enters_exactly_at_inside_threshold_never_earlier() {
        let mut tracker = PresenceTracker::new(3, 5);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let now = Utc::now();

        assert!(tracker.observe(&b, now).is_none(), "cycle 1 must not enter");
        assert!(tracker.observe(&b, now).is_none(), "cycle 2 must not enter");

        let event = tracker.observe(&b, now).expect("cycle 3 must enter");
        assert!(event.entered());
        assert_eq!(event.previous, PresenceState::Unknown);
        assert_eq!(event.current, PresenceState::Inside);
    }

    #[test]
    fn exits_after_exact_outside_threshold_with_one_event() {
        let mut tracker = PresenceTracker::new(1, 3);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let id = b.identity.clone();
        let now = Utc::now();

        assert!(tracker.observe(&b, now).unwrap().entered());

        assert!(tracker.on_missing_cycle(&id, now).is_none());
        assert!(tracker.on_missing_cycle(&id, now).is_none());

        let event = tracker.on_missing_cycle(&id, now).expect("third absence exits");
        assert!(event.exited());
        assert_eq!(event.previous, PresenceState::Inside);

        // Further absences stay Outside with no duplicate event.
        for _ in 0..5 {
            assert!(tracker.on_missing_cycle(&id, now).is_none());
        }
    }

    #[test]
    fn steady_state_observation_never_reemits_entered() {
        let mut tracker = PresenceTracker::new(1, 5);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let now = Utc::now();

        assert!(tracker.observe(&b, now).unwrap().entered());
        for _ in 0..10 {
            assert!(tracker.observe(&b, now).is_none());
        }

        // Counter clamped at the threshold, no unbounded growth.
        let state = tracker.state(&b.identity).unwrap();
        assert_eq!(state.inside_counter(), 1);
    }

    #[test]
    fn documented_scenario_inside_1_outside_2() {
        // Present at cycles 1 and 2, absent at cycles 3 and 4:
        // entered after cycle 1, exited after cycle 4.
        let mut tracker = PresenceTracker::new(1, 2);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let id = b.identity.clone();
        let now = Utc::now();

        let cycle1 = tracker.observe(&b, now);
        assert!(cycle1.is_some_and(|e| e.entered()));

        assert!(tracker.observe(&b, now).is_none());

        assert!(tracker.on_missing_cycle(&id, now).is_none());

        let cycle4 = tracker.on_missing_cycle(&id, now);
        assert!(cycle4.is_some_and(|e| e.exited()));
    }

    #[test]
    fn a_sighting_resets_the_outside_counter() {
        let mut tracker = PresenceTracker::new(1, 3);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let id = b.identity.clone();
        let now = Utc::now();

        tracker.observe(&b, now);
        tracker.on_missing_cycle(&id, now);
        tracker.on_missing_cycle(&id, now);

        // One sighting wipes the accumulated absences.
        tracker.observe(&b, now);
        assert_eq!(tracker.state(&id).unwrap().outside_counter(), 0);

        // The full outside threshold is required again.
        assert!(tracker.on_missing_cycle(&id, now).is_none());
        assert!(tracker.on_missing_cycle(&id, now).is_none());
        assert!(tracker.on_missing_cycle(&id, now).is_some());
    }

    #[test]
    fn outside_is_reachable_from_unknown() {
        let mut tracker = PresenceTracker::new(3, 2);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let id = b.identity.clone();
        let now = Utc::now();

        // One sighting, never verified inside, then gone.
        tracker.observe(&b, now);
        assert!(tracker.on_missing_cycle(&id, now).is_none());
        let event = tracker.on_missing_cycle(&id, now).expect("verified outside");
        assert_eq!(event.previous, PresenceState::Unknown);
        assert!(event.exited());
    }

    #[test]
    fn absence_of_an_unknown_identity_is_ignored() {
        let mut tracker = PresenceTracker::new(1, 1);
        let never_seen = identity("AA:BB:CC:DD:EE:99");

        assert!(tracker.on_missing_cycle(&never_seen, Utc::now()).is_none());
        assert!(tracker.state(&never_seen).is_none());
    }

    #[test]
    fn reentry_after_exit_emits_again() {
        let mut tracker = PresenceTracker::new(2, 2);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let id = b.identity.clone();
        let now = Utc::now();

        tracker.observe(&b, now);
        assert!(tracker.observe(&b, now).unwrap().entered());

        tracker.on_missing_cycle(&id, now);
        assert!(tracker.on_missing_cycle(&id, now).unwrap().exited());

        tracker.observe(&b, now);
        let reentry = tracker.observe(&b, now).expect("second entry");
        assert_eq!(reentry.previous, PresenceState::Outside);
        assert!(reentry.entered());
    }

    #[test]
    fn threshold_refresh_applies_to_next_call() {
        let mut tracker = PresenceTracker::new(5, 5);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let now = Utc::now();

        assert!(tracker.observe(&b, now).is_none());

        tracker.set_thresholds(2, 5);
        let event = tracker.observe(&b, now).expect("lowered threshold reached");
        assert!(event.entered());
    }

    #[test]
    fn removed_identity_is_forgotten() {
        let mut tracker = PresenceTracker::new(1, 5);
        let b = beacon("AA:BB:CC:DD:EE:01");
        let id = b.identity.clone();

        tracker.observe(&b, Utc::now());
        assert!(tracker.remove(&id));
        assert!(!tracker.remove(&id));
        assert!(tracker.known_identities().is_empty());
    }

    #[test]
    fn tracks_independent_identities_separately() {
        let mut tracker = PresenceTracker::new(1, 2);
        let a = beacon("AA:BB:CC:DD:EE:01");
        let b = beacon("AA:BB:CC:DD:EE:02");
        let now = Utc::now();

        assert!(tracker.observe(&a, now).unwrap().entered());
        assert!(tracker.observe(&b, now).unwrap().entered());

        tracker.on_missing_cycle(&a.identity, now);
        let gone = tracker.on_missing_cycle(&a.identity, now).unwrap();
        assert_eq!(gone.identity, a.identity);

        // b is untouched by a's exit.
        assert_eq!(
            tracker.state(&b.identity).unwrap().state,
            PresenceState::Inside
        );
    }
}
