//! Presence state tracking
//!
//! The PresenceTracker is the stateful core of the watcher:
//! - De-duplicates samples by telemetry timestamp (stale or repeated rows are ignored)
//! - Evaluates each new sample against the home zone
//! - Emits an event only when the presence state changes (edge-triggered)
//!
//! State lives only in memory. A fresh tracker starts `Unknown`, so the first
//! processed sample after a restart always yields `InitialHome` or `InitialAway`.

mod transitions;
#[cfg(test)]
mod tests;

use crate::domain::geofence::{evaluate, Evaluation, GeofenceError};
use crate::domain::types::{PositionSample, PresenceState, Transition, ZoneDefinition};
use tracing::{debug, info};

pub use transitions::next_event;

/// What the tracker made of one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Timestamp not newer than the last processed sample
    Stale { timestamp_ms: i64, last_seen_ms: i64 },
    /// Sample was evaluated; `transition` is set only on a state change
    Evaluated { evaluation: Evaluation, state: PresenceState, transition: Option<Transition> },
}

impl Observation {
    pub fn transition(&self) -> Option<Transition> {
        match self {
            Observation::Stale { .. } => None,
            Observation::Evaluated { transition, .. } => *transition,
        }
    }
}

/// Edge-triggered presence state machine for one device and one zone
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    /// Zone used while Unknown or Away
    zone: ZoneDefinition,
    /// Zone used while Home (radius + exit hysteresis)
    exit_zone: ZoneDefinition,
    state: PresenceState,
    /// Timestamp of the most recently processed sample
    last_seen_ms: Option<i64>,
}

impl PresenceTracker {
    /// Tracker with a single radius for entering and leaving
    pub fn new(zone: ZoneDefinition) -> Self {
        Self { zone, exit_zone: zone, state: PresenceState::Unknown, last_seen_ms: None }
    }

    /// Tracker that only reports leaving once the device is `hysteresis_m` beyond the radius
    pub fn with_hysteresis(zone: ZoneDefinition, hysteresis_m: f64) -> Result<Self, GeofenceError> {
        if !hysteresis_m.is_finite() || hysteresis_m < 0.0 {
            return Err(GeofenceError::InvalidHysteresis(hysteresis_m));
        }
        let exit_zone = zone.expanded(hysteresis_m)?;
        Ok(Self { exit_zone, ..Self::new(zone) })
    }

    /// Process one sample, returning the transition it caused (if any)
    pub fn process_sample(
        &mut self,
        sample: &PositionSample,
    ) -> Result<Option<Transition>, GeofenceError> {
        self.observe(sample).map(|observation| observation.transition())
    }

    /// Process one sample, returning the full observation for logging
    ///
    /// Invalid coordinates are rejected before any state is touched.
    pub fn observe(&mut self, sample: &PositionSample) -> Result<Observation, GeofenceError> {
        if let Some(last_seen_ms) = self.last_seen_ms {
            if sample.timestamp_ms <= last_seen_ms {
                debug!(
                    timestamp_ms = %sample.timestamp_ms,
                    last_seen_ms = %last_seen_ms,
                    "sample_stale"
                );
                return Ok(Observation::Stale { timestamp_ms: sample.timestamp_ms, last_seen_ms });
            }
        }

        let zone = match self.state {
            PresenceState::Home => &self.exit_zone,
            PresenceState::Unknown | PresenceState::Away => &self.zone,
        };
        let evaluation = evaluate(sample, zone)?;

        self.last_seen_ms = Some(sample.timestamp_ms);

        let transition = next_event(self.state, evaluation.is_inside).map(|event| Transition {
            event,
            distance_m: evaluation.distance_m,
            timestamp_ms: sample.timestamp_ms,
        });

        if let Some(t) = transition {
            let previous = self.state;
            self.state = t.event.resulting_state();
            info!(
                event = %t.event,
                from = %previous,
                to = %self.state,
                distance_m = %evaluation.distance_m as i64,
                timestamp_ms = %t.timestamp_ms,
                "presence_transition"
            );
        }

        Ok(Observation::Evaluated { evaluation, state: self.state, transition })
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn last_seen_ms(&self) -> Option<i64> {
        self.last_seen_ms
    }

    pub fn zone(&self) -> &ZoneDefinition {
        &self.zone
    }

    /// Extra margin applied to the radius while Home
    pub fn hysteresis_m(&self) -> f64 {
        self.exit_zone.radius_m() - self.zone.radius_m()
    }
}
