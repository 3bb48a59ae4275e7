//! Embeds a build identifier for the startup log line.
//!
//! Order: HOME_WATCH_BUILD_ID (set by packagers), `git describe` of the
//! checkout, then `v<crate version>` for source tarballs without `.git`.

use std::env;
use std::path::Path;
use std::process::Command;

fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=10"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!id.is_empty()).then_some(id)
}

fn main() {
    println!("cargo:rerun-if-env-changed=HOME_WATCH_BUILD_ID");

    let build_id = env::var("HOME_WATCH_BUILD_ID")
        .ok()
        .filter(|id| !id.trim().is_empty())
        .or_else(git_describe)
        .unwrap_or_else(|| format!("v{}", env!("CARGO_PKG_VERSION")));

    println!("cargo:rustc-env=HOME_WATCH_BUILD={}", build_id);

    // New commits move the branch ref, checkouts move HEAD
    if Path::new(".git").exists() {
        println!("cargo:rerun-if-changed=.git/HEAD");
        println!("cargo:rerun-if-changed=.git/refs/heads");
    }
}
