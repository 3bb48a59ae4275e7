//! Domain models - core presence types and the geofence evaluator
//!
//! This module contains the canonical data types used throughout the system:
//! - `ZoneDefinition` - the circular home zone (validated at construction)
//! - `PositionSample` - one latitude/longitude fix with its telemetry timestamp
//! - `PresenceState` - the tracker's belief: unknown, home or away
//! - `TransitionEvent` - edge-triggered presence changes
//! - `geofence` - pure distance / inside evaluation

pub mod geofence;
pub mod types;

// Re-export commonly used types at module level
pub use geofence::{evaluate, haversine_m, Evaluation, GeofenceError};
pub use types::{PositionSample, PresenceState, Transition, TransitionEvent, ZoneDefinition};
