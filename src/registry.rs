//! Agent descriptor model and registry loading.
//!
//! The registry is a directory of per-agent subdirectories, each holding an
//! `agent.json` descriptor that has already passed schema validation
//! upstream. This module only deserializes descriptors and applies the
//! quarantine exclusion map; it does not re-validate manifests.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Directories under the registry root that never contain agents.
const SKIP_DIRS: &[&str] = &[
    ".claude",
    ".git",
    ".github",
    ".idea",
    "__pycache__",
    "dist",
    "_not_yet_unsupported",
];

/// One installable mechanism an agent may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum DistributionKind {
    Binary,
    Npx,
    Uvx,
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistributionKind::Binary => "binary",
            DistributionKind::Npx => "npx",
            DistributionKind::Uvx => "uvx",
        };
        f.write_str(name)
    }
}

/// A per-platform binary target: where to fetch it and how to launch it.
#[derive(Debug, Clone, Deserialize)]
pub struct BinaryTarget {
    pub archive: String,
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A launcher-run package target (npx or uvx style).
#[derive(Debug, Clone, Deserialize)]
pub struct PackageTarget {
    pub package: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The distribution mechanisms declared by one agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Distribution {
    #[serde(default)]
    pub binary: Option<BTreeMap<String, BinaryTarget>>,
    #[serde(default)]
    pub npx: Option<PackageTarget>,
    #[serde(default)]
    pub uvx: Option<PackageTarget>,
}

impl Distribution {
    /// Kinds declared by this agent, in the fixed binary/npx/uvx order.
    pub fn kinds(&self) -> Vec<DistributionKind> {
        let mut kinds = Vec::new();
        if self.binary.is_some() {
            kinds.push(DistributionKind::Binary);
        }
        if self.npx.is_some() {
            kinds.push(DistributionKind::Npx);
        }
        if self.uvx.is_some() {
            kinds.push(DistributionKind::Uvx);
        }
        kinds
    }

    pub fn declares(&self, kind: DistributionKind) -> bool {
        match kind {
            DistributionKind::Binary => self.binary.is_some(),
            DistributionKind::Npx => self.npx.is_some(),
            DistributionKind::Uvx => self.uvx.is_some(),
        }
    }
}

/// A validated agent registry entry, immutable for the run.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default)]
    pub repository: Option<String>,
}

/// Map from agent id to free-text quarantine reason.
pub type Quarantine = BTreeMap<String, String>;

/// Load `quarantine.json` from the registry root.
///
/// A missing file means nothing is quarantined. An unreadable or malformed
/// file is warned about and treated the same way rather than failing the run.
pub fn load_quarantine(registry_dir: &Path) -> Quarantine {
    let path = registry_dir.join("quarantine.json");
    if !path.exists() {
        return Quarantine::new();
    }
    match std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from))
    {
        Ok(map) => map,
        Err(err) => {
            eprintln!("Warning: could not read {}: {err}", path.display());
            Quarantine::new()
        }
    }
}

/// Load all agents from the registry, excluding quarantined ones.
///
/// Subdirectories without an `agent.json` are ignored; malformed descriptors
/// are warned about and skipped so one broken entry cannot block the run.
pub fn load_registry(registry_dir: &Path) -> Result<Vec<AgentDescriptor>> {
    let quarantine = load_quarantine(registry_dir);

    let mut dirs: Vec<_> = std::fs::read_dir(registry_dir)
        .with_context(|| format!("read registry directory {}", registry_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut agents = Vec::new();
    for dir in dirs {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if SKIP_DIRS.contains(&name.as_str()) {
            continue;
        }

        let agent_json = dir.join("agent.json");
        if !agent_json.exists() {
            continue;
        }

        let agent: AgentDescriptor = match std::fs::read_to_string(&agent_json)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from))
        {
            Ok(agent) => agent,
            Err(err) => {
                eprintln!("Warning: invalid JSON in {}: {err}", agent_json.display());
                continue;
            }
        };

        if let Some(reason) = quarantine.get(&agent.id) {
            println!("  ⊘ Quarantined {}: {reason}", agent.id);
            continue;
        }

        tracing::debug!(
            id = %agent.id,
            version = agent.version.as_deref().unwrap_or("unversioned"),
            repository = agent.repository.as_deref().unwrap_or(""),
            "loaded agent descriptor"
        );
        if let Some(targets) = &agent.distribution.binary {
            for key in targets.keys() {
                if !crate::platform::KNOWN_PLATFORMS.contains(&key.as_str()) {
                    tracing::debug!(
                        agent = %agent.id,
                        platform = %key,
                        "binary target keyed outside the known platform set"
                    );
                }
            }
        }

        agents.push(agent);
    }

    if !quarantine.is_empty() {
        println!("  ({} agent(s) quarantined)", quarantine.len());
        println!();
    }

    Ok(agents)
}
