//! Presence transition table

use crate::domain::types::{PresenceState, TransitionEvent};

/// Event produced when a sample classified as `is_inside` arrives in `state`.
/// `None` means no change.
pub fn next_event(state: PresenceState, is_inside: bool) -> Option<TransitionEvent> {
    match (state, is_inside) {
        (PresenceState::Unknown, true) => Some(TransitionEvent::InitialHome),
        (PresenceState::Unknown, false) => Some(TransitionEvent::InitialAway),
        (PresenceState::Home, false) => Some(TransitionEvent::LeftHome),
        (PresenceState::Away, true) => Some(TransitionEvent::BackHome),
        (PresenceState::Home, true) | (PresenceState::Away, false) => None,
    }
}
