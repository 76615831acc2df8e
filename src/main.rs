use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;

mod auth;
mod classify;
mod cli;
mod extract;
mod fetch;
mod handshake;
mod platform;
mod process;
mod registry;
mod report;
mod resolve;
mod sandbox;
mod util;

use classify::LaunchNoun;
use cli::Cli;
use registry::{AgentDescriptor, DistributionKind};
use report::{Outcome, RunReport, VerificationResult};
use util::truncate_string;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.clean_all {
        if cli.sandbox_dir.exists() {
            println!("Removing all sandboxes: {}", cli.sandbox_dir.display());
            sandbox::clean_all(&cli.sandbox_dir)
                .with_context(|| format!("remove {}", cli.sandbox_dir.display()))?;
            println!("Done.");
        } else {
            println!("No sandboxes found at: {}", cli.sandbox_dir.display());
        }
        return Ok(());
    }

    println!("Platform: {}", platform::current_platform());
    println!("Registry: {}", cli.registry.display());
    println!("Sandbox:  {}", cli.sandbox_dir.display());
    println!();

    let mut agents = registry::load_registry(&cli.registry)?;
    println!("Found {} agents", agents.len());
    println!();

    if let Some(requested) = &cli.agent {
        let quarantine = registry::load_quarantine(&cli.registry);
        let requested_ids: Vec<String> = requested
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        let available: Vec<String> = agents.iter().map(|a| a.id.clone()).collect();

        // Quarantined ids are valid requests; they just stay excluded.
        let unknown: Vec<&String> = requested_ids
            .iter()
            .filter(|id| !available.contains(id) && !quarantine.contains_key(*id))
            .collect();
        if !unknown.is_empty() {
            let unknown: Vec<&str> = unknown.iter().map(|id| id.as_str()).collect();
            println!("Unknown agent(s): {}", unknown.join(", "));
            println!("Available: {}", available.join(", "));
            std::process::exit(1);
        }

        agents.retain(|a| requested_ids.contains(&a.id));
        let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
        println!("Verifying {} agent(s): {}", agents.len(), ids.join(", "));
        println!();
    }

    let mut report = RunReport::new();
    let total = agents.len();
    for (index, agent) in agents.iter().enumerate() {
        let kinds: Vec<String> = agent
            .distribution
            .kinds()
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("[{}/{total}] {} ({})", index + 1, agent.id, kinds.join(", "));

        for result in verify_agent(agent, &cli) {
            report.record(result);
        }
        println!();
    }

    report.print_summary();

    if !report.all_passed() {
        std::process::exit(1);
    }

    println!("All tests passed!");
    println!();
    println!("Sandboxes available at: {}", cli.sandbox_dir.display());
    Ok(())
}

/// Verify every requested distribution kind declared by one agent.
fn verify_agent(agent: &AgentDescriptor, cli: &Cli) -> Vec<VerificationResult> {
    let kinds: Vec<DistributionKind> = match cli.kind {
        Some(kind) if agent.distribution.declares(kind) => vec![kind],
        Some(_) => Vec::new(),
        None => agent.distribution.kinds(),
    };

    let mut results = Vec::new();
    for kind in kinds {
        println!("  Testing {kind}...");

        let sandbox = match sandbox::prepare(&cli.sandbox_dir, kind, &agent.id, cli.clean) {
            Ok(path) => path,
            Err(err) => {
                let result = VerificationResult::new(
                    &agent.id,
                    kind,
                    Outcome::Fail {
                        message: err.to_string(),
                    },
                );
                result.print_status();
                results.push(result);
                continue;
            }
        };

        let outcome = if cli.auth_check {
            verify_auth(agent, kind, &sandbox, Duration::from_secs(cli.auth_timeout), cli.verbose)
        } else {
            verify_basic(agent, kind, &sandbox, Duration::from_secs(cli.timeout))
        };

        let result = VerificationResult::new(&agent.id, kind, outcome);
        result.print_status();
        if cli.verbose {
            println!("    Sandbox: {}", sandbox.display());
        }
        results.push(result);
    }
    results
}

/// Basic liveness mode: launch the distribution and classify how it behaved.
fn verify_basic(
    agent: &AgentDescriptor,
    kind: DistributionKind,
    sandbox: &Path,
    timeout: Duration,
) -> Outcome {
    if kind == DistributionKind::Binary {
        if let Err(outcome) = prepare_binary(agent, sandbox) {
            return outcome;
        }
    }

    let plan = match resolve::resolve(agent, kind, sandbox) {
        Ok(plan) => plan,
        Err(err) if err.is_skip() => {
            return Outcome::Skip {
                message: err.to_string(),
            };
        }
        Err(err) => {
            return Outcome::Fail {
                message: err.to_string(),
            };
        }
    };

    println!(
        "    → Running: {}",
        util::format_command_line(&plan.command, &plan.args)
    );

    let result = match process::run(&plan, timeout) {
        Ok(result) => result,
        Err(err) => {
            return Outcome::Fail {
                message: err.to_string(),
            };
        }
    };

    let (noun, filter_noise) = match kind {
        DistributionKind::Binary => (LaunchNoun::Binary, false),
        DistributionKind::Npx => (LaunchNoun::Package, false),
        DistributionKind::Uvx => (LaunchNoun::Package, true),
    };
    classify::classify(&result, noun, filter_noise)
}

/// Auth handshake mode: drive one initialize exchange and validate the
/// advertised auth methods.
fn verify_auth(
    agent: &AgentDescriptor,
    kind: DistributionKind,
    sandbox: &Path,
    timeout: Duration,
    verbose: bool,
) -> Outcome {
    if kind == DistributionKind::Binary {
        // A distribution we cannot materialize here is an environment gap,
        // not an auth failure.
        if let Err(outcome) = prepare_binary(agent, sandbox) {
            return match outcome {
                Outcome::Fail { message } | Outcome::Skip { message } => Outcome::Skip { message },
                pass => pass,
            };
        }
    }

    let plan = match resolve::resolve(agent, kind, sandbox) {
        Ok(plan) => plan,
        Err(err) if err.is_skip() => {
            return Outcome::Skip {
                message: err.to_string(),
            };
        }
        Err(err) => {
            return Outcome::Fail {
                message: err.to_string(),
            };
        }
    };

    let auth_home = sandbox.join(sandbox::AUTH_HOME_DIR);
    if let Err(err) = std::fs::create_dir_all(&auth_home) {
        return Outcome::Fail {
            message: format!("failed to create {}: {err}", auth_home.display()),
        };
    }

    if verbose {
        println!(
            "    → Auth check: {}...",
            util::format_command_line(&plan.command, &plan.args[..plan.args.len().min(2)])
        );
    }

    let result = handshake::check_auth(&plan, &auth_home, timeout);
    if result.success {
        Outcome::Pass {
            message: format!("Auth OK: {}", auth::describe_methods(&result.auth_methods)),
        }
    } else {
        Outcome::Fail {
            message: result
                .error
                .unwrap_or_else(|| "Auth check failed".to_string()),
        }
    }
}

/// Download and extract a binary distribution into the sandbox, reusing the
/// archive cache and an existing extraction.
fn prepare_binary(agent: &AgentDescriptor, sandbox: &Path) -> Result<(), Outcome> {
    let target = resolve::binary_target(agent).map_err(|err| Outcome::Skip {
        message: err.to_string(),
    })?;

    let archive_name = fetch::archive_file_name(&target.archive);
    let archive_path = sandbox.join(&archive_name);
    let extract_dir = sandbox.join(sandbox::EXTRACTED_DIR);

    if archive_path.exists() {
        println!("    → Using cached archive: {archive_name}");
    } else {
        println!(
            "    → Downloading from: {}...",
            truncate_string(&target.archive, 80)
        );
        match fetch::fetch(&target.archive, &archive_path) {
            Ok(fetch::Fetched::Downloaded { bytes }) => {
                println!("      done ({:.1} MB)", bytes as f64 / 1024.0 / 1024.0);
            }
            Ok(fetch::Fetched::Cached) => {}
            Err(err) => {
                return Err(Outcome::Fail {
                    message: format!("Download failed: {err}"),
                });
            }
        }
    }

    if extract_dir.exists() {
        println!("    → Using cached extraction");
    } else {
        println!("    → Extracting archive...");
        extract::extract(&archive_path, &extract_dir).map_err(|err| Outcome::Fail {
            message: format!("Extraction failed: {err}"),
        })?;
    }

    Ok(())
}
