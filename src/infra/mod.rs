//! Infrastructure - configuration, logging and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML file, env overrides, validation)
//! - `logging` - tracing subscriber setup
//! - `metrics` - Lock-free counters with periodic summary

pub mod config;
pub mod logging;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use metrics::Metrics;
