//! Notification boundary and message templates
//!
//! Each transition event maps to a fixed subject and body template. The
//! notifier itself only moves a rendered message to its destination.

use crate::domain::types::{Transition, TransitionEvent};
use async_trait::async_trait;
use thiserror::Error;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("could not build message: {0}")]
    Message(String),
    #[error("delivery failed: {0}")]
    Transport(String),
}

/// A rendered alert for one transition
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event: TransitionEvent,
    pub subject: String,
    pub body: String,
    pub device_label: String,
    pub distance_m: u64,
    pub timestamp_ms: i64,
}

impl Notification {
    /// Render the template for `transition`. Times are shown at `display_offset`.
    pub fn for_transition(transition: &Transition, device_label: &str, display_offset: UtcOffset) -> Self {
        // Whole meters, rounded down
        let distance_m = transition.distance_m.max(0.0) as u64;
        let time = format_timestamp(transition.timestamp_ms, display_offset);

        let (subject, what) = match transition.event {
            TransitionEvent::InitialHome => ("At Home", "is at home"),
            TransitionEvent::InitialAway => ("Away", "is away from home"),
            TransitionEvent::LeftHome => ("Left Home", "just left home"),
            TransitionEvent::BackHome => ("Back Home", "just arrived home"),
        };

        Self {
            event: transition.event,
            subject: subject.to_string(),
            body: format!("{} {}. Distance {} m. Time {}.", device_label, what, distance_m, time),
            device_label: device_label.to_string(),
            distance_m,
            timestamp_ms: transition.timestamp_ms,
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS +HH:MM` at the given offset, raw millis if out of range
pub fn format_timestamp(timestamp_ms: i64, offset: UtcOffset) -> String {
    let format = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
    );
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_ms) * 1_000_000)
        .ok()
        .map(|utc| utc.to_offset(offset))
        .and_then(|local| local.format(format).ok())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Delivers rendered notifications to a fixed destination
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Short name for logs
    fn kind(&self) -> &'static str;
}

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            event = %notification.event,
            subject = %notification.subject,
            body = %notification.body,
            "notification_dry_run"
        );
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "log"
    }
}
