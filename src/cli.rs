//! CLI argument parsing for the verifier.
//!
//! A single flat flag surface: which agents, which distribution kinds, how
//! long to wait, and whether to run the deeper auth handshake instead of the
//! basic launch test.

use crate::registry::DistributionKind;
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SANDBOX_DIR: &str = ".sandbox";

/// Verify registered agents can be launched in isolated sandboxes.
#[derive(Parser, Debug)]
#[command(
    name = "acp-verify",
    version,
    about = "Verify ACP agents can be launched in isolated sandboxes",
    after_help = "Examples:\n  acp-verify                          # Verify all agents (basic launch test)\n  acp-verify -a claude,gemini         # Verify specific agents (comma-separated)\n  acp-verify -t npx                   # Verify only npx distributions\n  acp-verify --clean                  # Clean sandboxes before running\n  acp-verify --clean-all              # Remove all sandboxes and exit\n  acp-verify --auth-check             # Verify ACP auth support (deeper test)"
)]
pub struct Cli {
    /// Registry root containing per-agent directories with agent.json
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub registry: PathBuf,

    /// Verify specific agent IDs (comma-separated)
    #[arg(long, short = 'a', value_name = "IDS")]
    pub agent: Option<String>,

    /// Verify specific distribution type only
    #[arg(long = "type", short = 't', value_name = "KIND")]
    pub kind: Option<DistributionKind>,

    /// Process timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Sandbox directory
    #[arg(long, short = 's', value_name = "DIR", default_value = DEFAULT_SANDBOX_DIR)]
    pub sandbox_dir: PathBuf,

    /// Clean agent sandbox before running
    #[arg(long, short = 'c')]
    pub clean: bool,

    /// Remove all sandboxes and exit
    #[arg(long)]
    pub clean_all: bool,

    /// Verbose output
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Verify ACP auth support instead of basic launch test
    #[arg(long)]
    pub auth_check: bool,

    /// ACP handshake timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_AUTH_TIMEOUT_SECS)]
    pub auth_timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = Cli::parse_from(["acp-verify"]);
        assert_eq!(cli.timeout, 10);
        assert_eq!(cli.auth_timeout, 60);
        assert_eq!(cli.sandbox_dir, PathBuf::from(".sandbox"));
        assert!(!cli.clean);
        assert!(!cli.auth_check);
        assert!(cli.kind.is_none());
    }

    #[test]
    fn kind_filter_accepts_the_three_distribution_kinds() {
        for (flag, kind) in [
            ("binary", DistributionKind::Binary),
            ("npx", DistributionKind::Npx),
            ("uvx", DistributionKind::Uvx),
        ] {
            let cli = Cli::parse_from(["acp-verify", "-t", flag]);
            assert_eq!(cli.kind, Some(kind));
        }
    }

    #[test]
    fn agent_list_is_taken_verbatim_for_later_splitting() {
        let cli = Cli::parse_from(["acp-verify", "-a", "claude, gemini"]);
        assert_eq!(cli.agent.as_deref(), Some("claude, gemini"));
    }
}
