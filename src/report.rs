//! Verification outcomes and the run summary.
//!
//! An outcome is a proper three-variant enum rather than a success flag plus
//! a skipped flag, so contradictory states (a skipped success) cannot be
//! represented. The run's exit status is decided purely by whether any
//! non-skipped combination failed.

use crate::registry::DistributionKind;

/// Outcome of verifying one (agent, distribution-kind) combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass { message: String },
    Fail { message: String },
    Skip { message: String },
}

impl Outcome {
    pub fn message(&self) -> &str {
        match self {
            Outcome::Pass { message } | Outcome::Fail { message } | Outcome::Skip { message } => {
                message
            }
        }
    }
}

/// One recorded verification: the combination plus its outcome.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub agent_id: String,
    pub kind: DistributionKind,
    pub outcome: Outcome,
}

impl VerificationResult {
    pub fn new(agent_id: &str, kind: DistributionKind, outcome: Outcome) -> Self {
        VerificationResult {
            agent_id: agent_id.to_string(),
            kind,
            outcome,
        }
    }

    /// Print the per-combination status line as work proceeds.
    pub fn print_status(&self) {
        let message = self.outcome.message();
        match &self.outcome {
            Outcome::Skip { .. } => println!("    ⊘ Skipped: {message}"),
            Outcome::Pass { .. } => println!("    ✓ Success: {message}"),
            Outcome::Fail { .. } => println!("    ✗ Failed: {message}"),
        }
    }
}

/// Accumulated results for a whole run. Owns every `VerificationResult`.
#[derive(Debug, Default)]
pub struct RunReport {
    results: Vec<VerificationResult>,
}

impl RunReport {
    pub fn new() -> Self {
        RunReport::default()
    }

    pub fn record(&mut self, result: VerificationResult) {
        self.results.push(result);
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Pass { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Fail { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skip { .. }))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Whether every non-skipped combination passed.
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// Print the summary block and the failure listing.
    pub fn print_summary(&self) {
        println!("{}", "=".repeat(50));
        println!("Summary");
        println!("{}", "=".repeat(50));
        println!("  Passed:  {}", self.passed());
        println!("  Failed:  {}", self.failed());
        println!("  Skipped: {}", self.skipped());
        println!();

        if !self.all_passed() {
            println!("Failed tests:");
            for result in &self.results {
                if let Outcome::Fail { message } = &result.outcome {
                    println!("  - {} ({}): {message}", result.agent_id, result.kind);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(agent: &str) -> VerificationResult {
        VerificationResult::new(
            agent,
            DistributionKind::Npx,
            Outcome::Pass {
                message: "Exited cleanly".to_string(),
            },
        )
    }

    fn fail(agent: &str) -> VerificationResult {
        VerificationResult::new(
            agent,
            DistributionKind::Binary,
            Outcome::Fail {
                message: "Exit code: 1".to_string(),
            },
        )
    }

    fn skip(agent: &str) -> VerificationResult {
        VerificationResult::new(
            agent,
            DistributionKind::Binary,
            Outcome::Skip {
                message: "No build for linux-aarch64".to_string(),
            },
        )
    }

    #[test]
    fn counts_split_by_outcome_variant() {
        let mut report = RunReport::new();
        report.record(pass("a"));
        report.record(fail("b"));
        report.record(skip("c"));
        report.record(pass("d"));

        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn skips_never_fail_the_run() {
        let mut report = RunReport::new();
        report.record(pass("a"));
        report.record(skip("b"));
        assert!(report.all_passed());
    }

    #[test]
    fn one_failure_fails_the_run() {
        let mut report = RunReport::new();
        report.record(pass("a"));
        report.record(fail("b"));
        assert!(!report.all_passed());
    }

    #[test]
    fn empty_run_counts_as_passed() {
        assert!(RunReport::new().all_passed());
    }
}
