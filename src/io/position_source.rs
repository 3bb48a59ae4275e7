//! Position source boundary
//!
//! The watcher only ever asks one question of the telemetry store: what is the
//! most recent position for this device, if any.

use crate::domain::types::PositionSample;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("malformed telemetry: {0}")]
    Decode(String),
}

/// Read-only access to the latest known position of a device
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// `Ok(None)` means the device has not reported a position yet.
    /// `Err` is reserved for transport or query failures.
    async fn fetch_latest(&self, device_id: &str) -> Result<Option<PositionSample>, SourceError>;
}
