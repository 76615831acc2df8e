//! Basic-liveness outcome classification.
//!
//! The question answered here is "can this executable be invoked at all",
//! not "does it complete a task". Many non-zero exits are therefore
//! reclassified as success when the failure signature matches a recognized
//! "it ran, but needs configuration" pattern. The marker tables are the
//! whole policy: they are defined centrally so the reclassification rules
//! stay auditable and testable, and they are preserved verbatim from the
//! registry's established behavior — coincidental substring matches are a
//! known precision trade-off, accepted to avoid false negatives.

use crate::process::{ProcessResult, ProcessStatus};
use crate::report::Outcome;
use crate::util::truncate_string;

/// Markers meaning the process was waiting on interactive input.
pub const STDIN_MARKERS: &[&str] = &["input", "prompt", "stdin"];

/// Markers meaning the executable ran but its environment is not set up:
/// credential stores, permissions, missing config files, missing runtime
/// modules, missing required CLI arguments.
pub const ENV_SETUP_MARKERS: &[&str] = &[
    "keyring",
    "keychain",
    "credential",
    "permission denied",
    "access denied",
    "configuration file not found",
    "config file not found",
    "providers.json",
    "cannot find package",
    "module_not_found",
    "cannot find module",
    "accepts 1 arg",
    "required argument",
    "missing argument",
    "agent-file",
];

/// Maximum characters of stderr carried into a failure message.
pub const FAILURE_MESSAGE_LIMIT: usize = 200;

/// What kind of thing was launched, for message wording only.
#[derive(Debug, Clone, Copy)]
pub enum LaunchNoun {
    Binary,
    Package,
}

impl LaunchNoun {
    fn as_str(self) -> &'static str {
        match self {
            LaunchNoun::Binary => "Binary",
            LaunchNoun::Package => "Package",
        }
    }
}

/// Classify a completed launch attempt in basic-liveness mode.
///
/// `filter_noise` drops package-manager download chatter from the failure
/// message (used for uvx, whose stderr is dominated by install progress).
pub fn classify(result: &ProcessResult, noun: LaunchNoun, filter_noise: bool) -> Outcome {
    match result.status {
        ProcessStatus::TimedOut => {
            return Outcome::Pass {
                message: "Started successfully (terminated after timeout)".to_string(),
            };
        }
        ProcessStatus::Exited(0) => {
            return Outcome::Pass {
                message: "Exited cleanly".to_string(),
            };
        }
        ProcessStatus::Exited(_) | ProcessStatus::Signaled => {}
    }

    let combined = format!("{}{}", result.stdout, result.stderr).to_lowercase();

    if STDIN_MARKERS.iter().any(|marker| combined.contains(marker)) {
        return Outcome::Pass {
            message: format!("{} works (needs input)", noun.as_str()),
        };
    }
    if ENV_SETUP_MARKERS
        .iter()
        .any(|marker| combined.contains(marker))
    {
        return Outcome::Pass {
            message: format!("{} works (env setup needed)", noun.as_str()),
        };
    }

    Outcome::Fail {
        message: failure_message(result, filter_noise),
    }
}

fn failure_message(result: &ProcessResult, filter_noise: bool) -> String {
    let stderr = if filter_noise {
        filtered_error_lines(&result.stderr)
    } else if result.stderr.is_empty() {
        None
    } else {
        Some(result.stderr.clone())
    };

    match stderr {
        Some(text) => truncate_string(&text, FAILURE_MESSAGE_LIMIT),
        None => match result.status {
            ProcessStatus::Exited(code) => format!("Exit code: {code}"),
            ProcessStatus::Signaled => "Terminated by signal".to_string(),
            ProcessStatus::TimedOut => unreachable!("timeouts classify as pass"),
        },
    }
}

/// Strip download/install progress noise, keeping the first real error lines.
fn filtered_error_lines(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("Downloading")
                && !trimmed.starts_with("Installed")
                && !line.starts_with(' ')
        })
        .take(5)
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: ProcessStatus, stdout: &str, stderr: &str) -> ProcessResult {
        ProcessResult {
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn timeout_while_alive_is_a_pass() {
        let outcome = classify(
            &result(ProcessStatus::TimedOut, "banner\n", ""),
            LaunchNoun::Binary,
            false,
        );
        assert!(matches!(
            outcome,
            Outcome::Pass { message } if message.contains("terminated after timeout")
        ));
    }

    #[test]
    fn clean_exit_is_a_pass_regardless_of_output() {
        let outcome = classify(
            &result(ProcessStatus::Exited(0), "error error error", ""),
            LaunchNoun::Binary,
            false,
        );
        assert!(matches!(
            outcome,
            Outcome::Pass { message } if message == "Exited cleanly"
        ));
    }

    #[test]
    fn waiting_on_stdin_markers_reclassify_to_pass() {
        let outcome = classify(
            &result(ProcessStatus::Exited(1), "", "Error: no PROMPT provided"),
            LaunchNoun::Package,
            false,
        );
        assert!(matches!(
            outcome,
            Outcome::Pass { message } if message == "Package works (needs input)"
        ));
    }

    #[test]
    fn permission_denied_reclassifies_to_env_setup_pass() {
        let outcome = classify(
            &result(
                ProcessStatus::Exited(1),
                "",
                "open /etc/agent: Permission denied",
            ),
            LaunchNoun::Binary,
            false,
        );
        assert!(matches!(
            outcome,
            Outcome::Pass { message } if message == "Binary works (env setup needed)"
        ));
    }

    #[test]
    fn marker_matching_is_case_insensitive_across_both_streams() {
        let outcome = classify(
            &result(ProcessStatus::Exited(2), "KEYRING unavailable", ""),
            LaunchNoun::Binary,
            false,
        );
        assert!(matches!(outcome, Outcome::Pass { .. }));
    }

    #[test]
    fn unrecognized_failures_carry_truncated_stderr() {
        let long = "x".repeat(500);
        let outcome = classify(
            &result(ProcessStatus::Exited(1), "", &long),
            LaunchNoun::Binary,
            false,
        );
        match outcome {
            Outcome::Fail { message } => assert_eq!(message.len(), FAILURE_MESSAGE_LIMIT),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn truncation_counts_characters_for_multibyte_stderr() {
        let long = "ошибка ".repeat(100);
        let outcome = classify(
            &result(ProcessStatus::Exited(1), "", &long),
            LaunchNoun::Binary,
            false,
        );
        match outcome {
            Outcome::Fail { message } => {
                assert_eq!(message.chars().count(), FAILURE_MESSAGE_LIMIT);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn empty_stderr_failures_cite_the_exit_code() {
        let outcome = classify(
            &result(ProcessStatus::Exited(7), "", ""),
            LaunchNoun::Binary,
            false,
        );
        assert!(matches!(
            outcome,
            Outcome::Fail { message } if message == "Exit code: 7"
        ));
    }

    #[test]
    fn noise_filtering_keeps_real_errors_only() {
        let stderr = "Downloading cpython-3.12\n   progress bar\nInstalled 12 packages\nerror: no such option --acp\n";
        let outcome = classify(
            &result(ProcessStatus::Exited(2), "", stderr),
            LaunchNoun::Package,
            true,
        );
        assert!(matches!(
            outcome,
            Outcome::Fail { message } if message == "error: no such option --acp"
        ));
    }

    #[test]
    fn noise_only_stderr_falls_back_to_exit_code() {
        let stderr = "Downloading cpython-3.12\nInstalled 12 packages\n";
        let outcome = classify(
            &result(ProcessStatus::Exited(2), "", stderr),
            LaunchNoun::Package,
            true,
        );
        assert!(matches!(
            outcome,
            Outcome::Fail { message } if message == "Exit code: 2"
        ));
    }
}
