//! Shared types for presence tracking

use crate::domain::geofence::GeofenceError;

/// Circular home zone. Immutable once built; construct through [`ZoneDefinition::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneDefinition {
    latitude: f64,
    longitude: f64,
    radius_m: f64,
}

impl ZoneDefinition {
    /// Build a zone, rejecting out-of-range centers and non-positive radii
    pub fn new(latitude: f64, longitude: f64, radius_m: f64) -> Result<Self, GeofenceError> {
        if !valid_latitude(latitude) || !valid_longitude(longitude) {
            return Err(GeofenceError::InvalidCoordinate { latitude, longitude });
        }
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(GeofenceError::InvalidRadius(radius_m));
        }
        Ok(Self { latitude, longitude, radius_m })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Same center, radius grown by `margin_m`
    pub fn expanded(&self, margin_m: f64) -> Result<Self, GeofenceError> {
        Self::new(self.latitude, self.longitude, self.radius_m + margin_m)
    }
}

pub(crate) fn valid_latitude(latitude: f64) -> bool {
    latitude.is_finite() && (-90.0..=90.0).contains(&latitude)
}

pub(crate) fn valid_longitude(longitude: f64) -> bool {
    longitude.is_finite() && (-180.0..=180.0).contains(&longitude)
}

/// One position fix as reported by the telemetry store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Telemetry timestamp (epoch milliseconds)
    pub timestamp_ms: i64,
}

impl PositionSample {
    #[inline]
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self { latitude, longitude, timestamp_ms }
    }
}

/// Tracker belief about where the device is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceState {
    #[default]
    Unknown,
    Home,
    Away,
}

impl PresenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceState::Unknown => "unknown",
            PresenceState::Home => "home",
            PresenceState::Away => "away",
        }
    }
}

impl std::fmt::Display for PresenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge-triggered presence change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionEvent {
    /// First sample after startup was inside the zone
    InitialHome,
    /// First sample after startup was outside the zone
    InitialAway,
    LeftHome,
    BackHome,
}

impl TransitionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionEvent::InitialHome => "initial_home",
            TransitionEvent::InitialAway => "initial_away",
            TransitionEvent::LeftHome => "left_home",
            TransitionEvent::BackHome => "back_home",
        }
    }

    /// State the tracker holds after this event
    pub fn resulting_state(&self) -> PresenceState {
        match self {
            TransitionEvent::InitialHome | TransitionEvent::BackHome => PresenceState::Home,
            TransitionEvent::InitialAway | TransitionEvent::LeftHome => PresenceState::Away,
        }
    }
}

impl std::fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition as emitted by the tracker, with the measurement that caused it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub event: TransitionEvent,
    pub distance_m: f64,
    pub timestamp_ms: i64,
}
