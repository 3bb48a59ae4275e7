//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `position_source` - Position source trait (latest fix for a device)
//! - `thingsboard` - ThingsBoard REST implementation of the position source
//! - `notifier` - Notifier trait, message templates and the log-only notifier
//! - `smtp` - SMTP (STARTTLS) email notifier

pub mod notifier;
pub mod position_source;
pub mod smtp;
pub mod thingsboard;

// Re-export commonly used types
pub use notifier::{format_timestamp, LogNotifier, Notification, Notifier, NotifyError};
pub use position_source::{PositionSource, SourceError};
pub use smtp::{SmtpConfig, SmtpNotifier};
pub use thingsboard::{ThingsBoardConfig, ThingsBoardSource};
