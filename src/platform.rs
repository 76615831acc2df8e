//! Current-platform identification for binary distributions.
//!
//! Binary targets are keyed by `{os}-{arch}` identifiers drawn from a fixed
//! six-value set. Anything outside that set gets a best-effort fallback so a
//! missing build is reported with a recognizable name instead of a panic.

/// The platform identifiers a binary distribution map may contain.
pub const KNOWN_PLATFORMS: &[&str] = &[
    "darwin-aarch64",
    "darwin-x86_64",
    "linux-aarch64",
    "linux-x86_64",
    "windows-x86_64",
    "windows-aarch64",
];

/// Identifier for the platform this verifier is running on.
pub fn current_platform() -> String {
    platform_id(std::env::consts::OS, std::env::consts::ARCH)
}

fn platform_id(os: &str, arch: &str) -> String {
    match (os, arch) {
        ("macos", "aarch64") => "darwin-aarch64".to_string(),
        ("macos", "x86_64") => "darwin-x86_64".to_string(),
        ("linux", "aarch64") => "linux-aarch64".to_string(),
        ("linux", "x86_64") => "linux-x86_64".to_string(),
        ("windows", "x86_64") => "windows-x86_64".to_string(),
        ("windows", "aarch64") => "windows-aarch64".to_string(),
        (os, arch) => format!("{os}-{arch}"),
    }
}
