//! Structured verdicts and the parser for the harness line protocol.

mod parser;

use serde::{Deserialize, Serialize};

pub use parser::{parse, ParsedReport};

/// Name of the synthetic outcome reported when the policy gate rejects code.
pub const VALIDATION_OUTCOME: &str = "Code validation";

/// Name of the synthetic outcome for timeouts and infrastructure failures.
pub const EXECUTION_OUTCOME: &str = "Execution";

/// One test's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
        }
    }

    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
        }
    }
}

/// The single result every execution produces, whatever went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<String>,
    pub test_results: Vec<TestOutcome>,
    pub raw_output: String,
    pub passed_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExecutionResult {
    /// A failed execution that never produced test output.
    pub fn failure(outcome_name: &str, error: impl Into<String>, raw_output: String) -> Self {
        let error = error.into();
        Self {
            success: false,
            error: Some(error.clone()),
            test_results: vec![TestOutcome::fail(outcome_name, error)],
            raw_output,
            passed_count: 0,
            failed_count: 1,
            total_count: 1,
            warnings: Vec::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::failure(VALIDATION_OUTCOME, reason, String::new())
    }

    pub fn timed_out(seconds: u64) -> Self {
        Self::failure(
            EXECUTION_OUTCOME,
            format!("Execution timed out after {} seconds", seconds),
            String::new(),
        )
    }

    pub fn infrastructure(error: impl std::fmt::Display) -> Self {
        Self::failure(
            EXECUTION_OUTCOME,
            format!("Execution error: {}", error),
            String::new(),
        )
    }

    /// Build the verdict for a harness that ran to completion.
    pub fn from_output(exit_success: bool, raw_output: String) -> Self {
        let report = parse(&raw_output);
        let error = if exit_success {
            None
        } else {
            Some(report.failure_summary())
        };

        Self {
            success: exit_success,
            error,
            test_results: report.test_results,
            raw_output,
            passed_count: report.passed_count,
            failed_count: report.failed_count,
            total_count: report.total_count,
            warnings: report.warnings,
        }
    }
}
