//! Tracing subscriber setup
//!
//! Level comes from RUST_LOG (default: info). Timestamps are RFC 3339 UTC.

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `json` switches to one JSON object per line.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    // try_init: a second call (tests, tools) keeps the first subscriber
    let _ = if json { builder.json().try_init() } else { builder.try_init() };
}
