//! Turning a distribution target into something we can actually spawn.
//!
//! Resolution is the seam between declarative registry data and the process
//! layer: it decides which file runs, from where, and with what environment
//! overlay. Skips and failures are distinct outcomes here — a platform with
//! no build or a machine without the npm/uv launcher is expected, while a
//! promised executable that is missing from the archive is a defect.

use crate::platform;
use crate::registry::{AgentDescriptor, BinaryTarget, DistributionKind};
use crate::sandbox::{EXTRACTED_DIR, UV_CACHE_DIR};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Interpreters resolved from PATH instead of the extracted tree.
const SYSTEM_INTERPRETERS: &[&str] = &["node", "python", "python3", "java", "ruby"];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No build for {0}")]
    NoBuildForPlatform(String),
    #[error("{0} not installed")]
    LauncherMissing(&'static str),
    #[error("System command not found: {0}")]
    InterpreterMissing(String),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    /// Whether this error describes an expected environment gap (skip)
    /// rather than a broken distribution (failure).
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ResolveError::NoBuildForPlatform(_)
                | ResolveError::LauncherMissing(_)
                | ResolveError::InterpreterMissing(_)
        )
    }
}

/// A fully resolved launch: command, args, working directory, and the
/// environment overlay merged on top of the inherited environment.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

/// The binary target for the current platform, if one is declared.
pub fn binary_target(agent: &AgentDescriptor) -> Result<&BinaryTarget, ResolveError> {
    let current = platform::current_platform();
    agent
        .distribution
        .binary
        .as_ref()
        .and_then(|targets| targets.get(&current))
        .ok_or(ResolveError::NoBuildForPlatform(current))
}

/// Resolve one (agent, kind) combination into a launch plan.
///
/// For binary distributions the archive must already be extracted into the
/// sandbox; fetch/extract ordering is owned by the verification loop.
pub fn resolve(
    agent: &AgentDescriptor,
    kind: DistributionKind,
    sandbox: &Path,
) -> Result<LaunchPlan, ResolveError> {
    match kind {
        DistributionKind::Binary => resolve_binary(agent, sandbox),
        DistributionKind::Npx => resolve_npx(agent, sandbox),
        DistributionKind::Uvx => resolve_uvx(agent, sandbox),
    }
}

fn resolve_binary(agent: &AgentDescriptor, sandbox: &Path) -> Result<LaunchPlan, ResolveError> {
    let target = binary_target(agent)?;
    let extracted = sandbox.join(EXTRACTED_DIR);

    let cmd = target.cmd.strip_prefix("./").unwrap_or(&target.cmd);

    let command = if SYSTEM_INTERPRETERS.contains(&cmd) {
        which::which(cmd).map_err(|_| ResolveError::InterpreterMissing(cmd.to_string()))?
    } else {
        let exe = locate_executable(&extracted, cmd)?;
        set_executable_bit(&exe)?;
        exe
    };

    Ok(LaunchPlan {
        command,
        args: target.args.clone(),
        cwd: extracted,
        env: target.env.clone(),
    })
}

fn resolve_npx(agent: &AgentDescriptor, sandbox: &Path) -> Result<LaunchPlan, ResolveError> {
    let target = agent
        .distribution
        .npx
        .as_ref()
        .ok_or(ResolveError::NoBuildForPlatform("npx".to_string()))?;
    // npx ships with npm; its presence is what we actually check for.
    let npx = which::which("npm")
        .and(which::which("npx"))
        .map_err(|_| ResolveError::LauncherMissing("npm"))?;

    let mut args = vec![
        "--prefix".to_string(),
        sandbox.display().to_string(),
        "--yes".to_string(),
        target.package.clone(),
    ];
    args.extend(target.args.iter().cloned());

    Ok(LaunchPlan {
        command: npx,
        args,
        cwd: sandbox.to_path_buf(),
        env: target.env.clone(),
    })
}

fn resolve_uvx(agent: &AgentDescriptor, sandbox: &Path) -> Result<LaunchPlan, ResolveError> {
    let target = agent
        .distribution
        .uvx
        .as_ref()
        .ok_or(ResolveError::NoBuildForPlatform("uvx".to_string()))?;
    let uvx = which::which("uv")
        .and(which::which("uvx"))
        .map_err(|_| ResolveError::LauncherMissing("uv"))?;

    let cache_dir = sandbox.join(UV_CACHE_DIR);
    std::fs::create_dir_all(&cache_dir).map_err(|source| ResolveError::Io {
        path: cache_dir.clone(),
        source,
    })?;

    let mut args = vec![
        "--cache-dir".to_string(),
        cache_dir.display().to_string(),
        target.package.clone(),
    ];
    args.extend(target.args.iter().cloned());

    Ok(LaunchPlan {
        command: uvx,
        args,
        cwd: sandbox.to_path_buf(),
        env: target.env.clone(),
    })
}

/// Find `cmd` somewhere under the extracted tree.
///
/// Falls back to treating a lone extracted file as the executable: raw
/// single-file downloads ship without an archive wrapper, so the one file is
/// renamed to the expected command name on first use.
fn locate_executable(extracted: &Path, cmd: &str) -> Result<PathBuf, ResolveError> {
    if let Some(found) = find_by_name(extracted, cmd) {
        return Ok(found);
    }

    let entries: Vec<PathBuf> = std::fs::read_dir(extracted)
        .map_err(|source| ResolveError::Io {
            path: extracted.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    if let [lone] = entries.as_slice() {
        if lone.is_file() {
            let expected = extracted.join(cmd);
            if !expected.exists() {
                std::fs::rename(lone, &expected).map_err(|source| ResolveError::Io {
                    path: expected.clone(),
                    source,
                })?;
            }
            return Ok(expected);
        }
    }

    let direct = extracted.join(cmd);
    if direct.exists() {
        return Ok(direct);
    }
    Err(ResolveError::ExecutableNotFound(cmd.to_string()))
}

fn find_by_name(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.file_name().is_some_and(|n| n == name) {
            return Some(path);
        }
        if path.is_dir() {
            subdirs.push(path);
        }
    }
    subdirs.sort();
    subdirs.iter().find_map(|sub| find_by_name(sub, name))
}

#[cfg(unix)]
fn set_executable_bit(path: &Path) -> Result<(), ResolveError> {
    use std::os::unix::fs::PermissionsExt;
    let io_err = |source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(path).map_err(io_err)?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions).map_err(io_err)
}

#[cfg(not(unix))]
fn set_executable_bit(_path: &Path) -> Result<(), ResolveError> {
    Ok(())
}
