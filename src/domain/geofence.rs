//! Geofence evaluation
//!
//! Great-circle distance between a position fix and the zone center, and
//! the inside/outside decision. Pure functions, no state.

use crate::domain::types::{valid_latitude, valid_longitude, PositionSample, ZoneDefinition};
use thiserror::Error;

/// Mean Earth radius (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeofenceError {
    #[error("invalid coordinate lat={latitude} lon={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    #[error("invalid radius {0} m (must be finite and > 0)")]
    InvalidRadius(f64),
    #[error("invalid exit hysteresis {0} m (must be finite and >= 0)")]
    InvalidHysteresis(f64),
}

/// Result of evaluating one position against a zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub is_inside: bool,
    pub distance_m: f64,
}

/// Haversine distance in meters
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards asin against a > 1 from rounding on antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// Classify a position against the zone. Boundary is inclusive.
pub fn evaluate(position: &PositionSample, zone: &ZoneDefinition) -> Result<Evaluation, GeofenceError> {
    if !valid_latitude(position.latitude) || !valid_longitude(position.longitude) {
        return Err(GeofenceError::InvalidCoordinate {
            latitude: position.latitude,
            longitude: position.longitude,
        });
    }

    let distance_m =
        haversine_m(position.latitude, position.longitude, zone.latitude(), zone.longitude());

    Ok(Evaluation { is_inside: distance_m <= zone.radius_m(), distance_m })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const HOME_LAT: f64 = 34.02877;
    pub(crate) const HOME_LON: f64 = -118.27968;

    /// Sample `meters` due north of the home center
    pub(crate) fn sample_north(meters: f64, ts: i64) -> PositionSample {
        let dlat = (meters / EARTH_RADIUS_M).to_degrees();
        PositionSample::new(HOME_LAT + dlat, HOME_LON, ts)
    }

    fn home_zone(radius_m: f64) -> ZoneDefinition {
        ZoneDefinition::new(HOME_LAT, HOME_LON, radius_m).unwrap()
    }

    #[test]
    fn test_zero_distance_at_center() {
        let eval = evaluate(&PositionSample::new(HOME_LAT, HOME_LON, 0), &home_zone(120.0)).unwrap();
        assert!(eval.is_inside);
        assert!(eval.distance_m.abs() < 1e-9);
    }

    #[test]
    fn test_meridian_offset_accuracy() {
        for meters in [10.0, 50.0, 120.0, 300.0, 1_000.0] {
            let eval = evaluate(&sample_north(meters, 0), &home_zone(120.0)).unwrap();
            assert!((eval.distance_m - meters).abs() < 0.01, "{} vs {}", eval.distance_m, meters);
        }
    }

    #[test]
    fn test_known_city_distance() {
        // Los Angeles City Hall to Santa Monica Pier, roughly 24.3 km
        let d = haversine_m(34.0537, -118.2427, 34.0083, -118.4988);
        assert!((d - 24_000.0).abs() < 800.0, "got {}", d);
    }

    #[test]
    fn test_boundary_is_inside() {
        let sample = sample_north(120.0, 0);
        let exact = haversine_m(sample.latitude, sample.longitude, HOME_LAT, HOME_LON);
        let zone = home_zone(exact);

        let eval = evaluate(&sample, &zone).unwrap();
        assert_eq!(eval.distance_m, zone.radius_m());
        assert!(eval.is_inside);

        let just_outside = sample_north(120.5, 0);
        assert!(!evaluate(&just_outside, &zone).unwrap().is_inside);
    }

    #[test]
    fn test_rejects_invalid_position() {
        let zone = home_zone(120.0);
        for (lat, lon) in [(f64::NAN, 0.0), (0.0, f64::INFINITY), (95.0, 0.0), (0.0, 181.0)] {
            let err = evaluate(&PositionSample::new(lat, lon, 0), &zone).unwrap_err();
            assert!(matches!(err, GeofenceError::InvalidCoordinate { .. }));
        }
    }
}
