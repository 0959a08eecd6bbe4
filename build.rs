// build.rs - Build metadata for alarm-notify
//
// Exports the build time and git commit so the binary can log what it was
// built from.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=.git/HEAD");

    set_build_env_vars();
    print_build_summary();
}

/// Set build environment variables that the code expects
fn set_build_env_vars() {
    println!(
        "cargo:rustc-env=ALARM_NOTIFY_BUILD_TIMESTAMP={}",
        chrono::Utc::now().to_rfc3339()
    );

    // Optionally set git hash if in a git repository
    let git_hash = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=ALARM_NOTIFY_GIT_HASH={}", git_hash);
}

/// Print enabled optional features during verbose builds
fn print_build_summary() {
    if env::var("ALARM_NOTIFY_BUILD_VERBOSE").is_err() {
        return;
    }

    let features: Vec<_> = ["MQTT", "EMAIL"]
        .iter()
        .filter(|name| env::var(format!("CARGO_FEATURE_{}", name)).is_ok())
        .map(|name| name.to_lowercase())
        .collect();

    println!("cargo:warning=alarm-notify features: {}", features.join(", "));
}
