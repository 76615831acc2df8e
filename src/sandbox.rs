//! Per-(kind, agent) sandbox directories.
//!
//! Layout: `<root>/<kind>/<agent-id>/` holding the downloaded archive, the
//! `extracted/` tree, and mode-specific scratch dirs (`uv-cache/`,
//! `auth-home/`). Sandboxes persist across runs so archives act as a download
//! cache; cleaning is deliberately asymmetric — for binary distributions only
//! the extraction is wiped, because re-downloading large archives is the
//! expensive part.

use crate::registry::DistributionKind;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Subdirectory holding extracted archive contents.
pub const EXTRACTED_DIR: &str = "extracted";
/// Subdirectory used as the isolated HOME during handshake checks.
pub const AUTH_HOME_DIR: &str = "auth-home";
/// Subdirectory used as the uv package cache.
pub const UV_CACHE_DIR: &str = "uv-cache";

/// Sandbox creation is the one mandatory filesystem operation: without a
/// sandbox the combination cannot be verified at all.
#[derive(Debug, Error)]
#[error("failed to create sandbox {path}: {source}")]
pub struct SandboxError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Path of the sandbox for one (kind, agent) combination.
pub fn sandbox_path(root: &Path, kind: DistributionKind, agent_id: &str) -> PathBuf {
    root.join(kind.to_string()).join(agent_id)
}

/// Create (and optionally clean) the sandbox for one combination.
///
/// Cleaning is advisory: a failed removal is logged and the run continues
/// with whatever state is on disk. Creation failure is mandatory and
/// propagates.
pub fn prepare(
    root: &Path,
    kind: DistributionKind,
    agent_id: &str,
    clean: bool,
) -> Result<PathBuf, SandboxError> {
    let sandbox = sandbox_path(root, kind, agent_id);

    if clean && sandbox.exists() {
        match kind {
            DistributionKind::Binary => {
                let extracted = sandbox.join(EXTRACTED_DIR);
                if extracted.exists() {
                    println!("    Cleaning extracted files (keeping downloads)...");
                    remove_advisory(&extracted);
                }
            }
            DistributionKind::Npx | DistributionKind::Uvx => {
                println!("    Cleaning sandbox...");
                remove_advisory(&sandbox);
            }
        }
    }

    std::fs::create_dir_all(&sandbox).map_err(|source| SandboxError {
        path: sandbox.clone(),
        source,
    })?;
    Ok(sandbox)
}

/// Remove the entire sandbox root (`--clean-all`).
pub fn clean_all(root: &Path) -> io::Result<()> {
    std::fs::remove_dir_all(root)
}

fn remove_advisory(path: &Path) {
    if let Err(err) = std::fs::remove_dir_all(path) {
        tracing::warn!(path = %path.display(), %err, "sandbox cleanup failed; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_creates_nested_sandbox() {
        let root = tempfile::tempdir().expect("tempdir");
        let sandbox = prepare(root.path(), DistributionKind::Npx, "alpha", false)
            .expect("prepare sandbox");
        assert!(sandbox.is_dir());
        assert!(sandbox.ends_with("npx/alpha"));
    }

    #[test]
    fn clean_for_binary_keeps_archive_cache() {
        let root = tempfile::tempdir().expect("tempdir");
        let sandbox = prepare(root.path(), DistributionKind::Binary, "alpha", false)
            .expect("prepare sandbox");
        let archive = sandbox.join("alpha.tar.gz");
        let extracted = sandbox.join(EXTRACTED_DIR);
        std::fs::write(&archive, b"cached bytes").expect("write archive");
        std::fs::create_dir(&extracted).expect("create extracted");
        std::fs::write(extracted.join("alpha"), b"binary").expect("write binary");

        prepare(root.path(), DistributionKind::Binary, "alpha", true).expect("clean prepare");

        assert!(archive.exists(), "archive cache must survive clean");
        assert!(!extracted.exists(), "extracted tree must be wiped");
    }

    #[test]
    fn clean_for_package_kinds_removes_everything() {
        let root = tempfile::tempdir().expect("tempdir");
        let sandbox =
            prepare(root.path(), DistributionKind::Uvx, "alpha", false).expect("prepare sandbox");
        std::fs::write(sandbox.join("stale"), b"x").expect("write file");

        let sandbox = prepare(root.path(), DistributionKind::Uvx, "alpha", true)
            .expect("clean prepare");
        assert!(sandbox.is_dir());
        assert!(!sandbox.join("stale").exists());
    }

    #[test]
    fn clean_all_removes_the_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let base = root.path().join("sandboxes");
        prepare(&base, DistributionKind::Npx, "alpha", false).expect("prepare sandbox");

        clean_all(&base).expect("clean all");
        assert!(!base.exists());
    }
}
