//! Home presence watcher library
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;

/// Build identifier: packager-supplied id, `git describe`, or `v<version>`
pub const BUILD_ID: &str = env!("HOME_WATCH_BUILD");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_id_present() {
        assert!(!BUILD_ID.trim().is_empty());
        assert!(!BUILD_ID.contains('\n'));
    }
}
