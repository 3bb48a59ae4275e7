//! Services - watcher logic and state
//!
//! - `presence` - Edge-triggered presence state machine
//! - `poll_loop` - Fixed-interval fetch/evaluate/notify driver
//! - `notify_worker` - Async notification delivery with retries

pub mod notify_worker;
pub mod poll_loop;
pub mod presence;

pub use notify_worker::{create_notify_worker, NotifySender, NotifyWorker, RetryPolicy};
pub use poll_loop::{CycleOutcome, PollLoop};
pub use presence::{Observation, PresenceTracker};
