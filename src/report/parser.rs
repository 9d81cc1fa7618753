use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::report::{TestOutcome, EXECUTION_OUTCOME};

const PASSED_PREFIX: &str = "PASSED:";
const FAILED_PREFIX: &str = "FAILED:";
const ERROR_IN_PREFIX: &str = "ERROR in";
const LOAD_ERROR_PREFIX: &str = "ERROR: Failed to load test code";
const SUCCESS_MARKER: &str = "SUCCESS: All tests passed";

static FOUND_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Found (\d+) test\(s\)$").expect("static regex is valid")
});

/// Structured view of one harness run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReport {
    pub test_results: Vec<TestOutcome>,
    pub passed_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    /// Count announced by the `Found N test(s)` line, if any.
    pub declared_count: Option<usize>,
    pub warnings: Vec<String>,
    /// Whether any per-test status line was seen.
    structured: bool,
}

impl ParsedReport {
    /// One-line description of why a run that exited nonzero failed.
    pub fn failure_summary(&self) -> String {
        if !self.structured {
            return self
                .test_results
                .first()
                .and_then(|outcome| outcome.error.clone())
                .unwrap_or_else(|| "Unknown error".to_string());
        }
        if self.failed_count > 0 {
            format!("{} of {} tests failed", self.failed_count, self.total_count)
        } else {
            "Test run did not complete".to_string()
        }
    }
}

/// Parse the merged output of a harness run.
///
/// The summary and success lines are informational; counts come from the
/// per-test lines.
///
/// Always returns at least one outcome: when no per-test lines are present a
/// synthetic outcome is derived from the success marker, the load-error marker
/// or the first line of output, in that order.
pub fn parse(raw_output: &str) -> ParsedReport {
    let mut report = ParsedReport::default();

    for line in raw_output.lines().map(str::trim) {
        if let Some(caps) = FOUND_LINE.captures(line) {
            report.declared_count = caps[1].parse().ok();
        } else if let Some(rest) = line.strip_prefix(PASSED_PREFIX) {
            report.record(TestOutcome::pass(rest.trim()));
        } else if let Some(rest) = line.strip_prefix(FAILED_PREFIX) {
            let rest = rest.trim();
            let (name, message) = match rest.split_once(" - ") {
                Some((name, message)) => (name, clean_message(message, "Assertion failed")),
                None => (rest.trim_end_matches('-'), "Assertion failed".to_string()),
            };
            report.record(TestOutcome::fail(name.trim(), message));
        } else if let Some(rest) = line.strip_prefix(ERROR_IN_PREFIX) {
            let (name, message) = match rest.trim().split_once(':') {
                Some((name, message)) => (name, clean_message(message, "Error occurred")),
                None => (rest.trim(), "Error occurred".to_string()),
            };
            report.record(TestOutcome::fail(name.trim(), message));
        }
    }

    if report.structured {
        if let Some(declared) = report.declared_count {
            if declared != report.test_results.len() {
                let message = format!(
                    "Harness reported {} test(s) but {} result(s) were parsed",
                    declared,
                    report.test_results.len()
                );
                warn!(declared, parsed = report.test_results.len(), "Test count mismatch");
                report.warnings.push(message);
            }
        }
    } else {
        report.test_results.push(fallback_outcome(raw_output));
        if report.test_results[0].passed {
            report.passed_count = 1;
        } else {
            report.failed_count = 1;
        }
    }

    report.total_count = match report.declared_count {
        Some(declared) if declared > 0 => declared,
        _ => report.test_results.len(),
    };

    report
}

impl ParsedReport {
    fn record(&mut self, outcome: TestOutcome) {
        self.structured = true;
        if outcome.passed {
            self.passed_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.test_results.push(outcome);
    }
}

fn fallback_outcome(raw_output: &str) -> TestOutcome {
    let mut lines = raw_output.lines().map(str::trim);

    if lines.clone().any(|line| line == SUCCESS_MARKER) {
        return TestOutcome::pass("All tests");
    }
    if lines.clone().any(|line| line.starts_with(LOAD_ERROR_PREFIX)) {
        return TestOutcome::fail("Test setup", "Failed to load test code");
    }

    let first = lines
        .find(|line| !line.is_empty() && !FOUND_LINE.is_match(line))
        .unwrap_or("Unknown error");
    TestOutcome::fail(EXECUTION_OUTCOME, first)
}

/// Keep the first line of a message and drop anything traceback-like.
fn clean_message(message: &str, default: &str) -> String {
    let first_line = message.lines().next().unwrap_or("");
    let cleaned = first_line
        .split("Traceback")
        .next()
        .unwrap_or("")
        .trim();
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_run() {
        let output = "Found 3 test(s)\n\
                      PASSED: test_a\n\
                      PASSED: test_b\n\
                      FAILED: test_c - expected [2, 2] got [2]\n\
                      \n\
                      Test Summary: 2 passed, 1 failed out of 3 total\n";
        let report = parse(output);

        assert_eq!(report.passed_count, 2);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.total_count, 3);
        assert_eq!(
            report.test_results,
            vec![
                TestOutcome::pass("test_a"),
                TestOutcome::pass("test_b"),
                TestOutcome::fail("test_c", "expected [2, 2] got [2]"),
            ]
        );
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_parse_runtime_error_line() {
        let report = parse("Found 1 test(s)\nERROR in test_x: NameError: name 'foo' is not defined\n");
        assert_eq!(
            report.test_results,
            vec![TestOutcome::fail("test_x", "NameError: name 'foo' is not defined")]
        );
        assert_eq!(report.failed_count, 1);
    }

    #[test]
    fn test_failed_without_message_defaults() {
        let report = parse("FAILED: test_y\nFAILED: test_z - \nFAILED: test_w - Traceback (most recent call last)\n");
        assert_eq!(report.test_results[0].error.as_deref(), Some("Assertion failed"));
        assert_eq!(report.test_results[1].name, "test_z");
        assert_eq!(report.test_results[1].error.as_deref(), Some("Assertion failed"));
        assert_eq!(report.test_results[2].error.as_deref(), Some("Assertion failed"));
        assert_eq!(report.total_count, 3);
    }

    #[test]
    fn test_traceback_content_is_stripped() {
        let report = parse("ERROR in test_q: ValueError: bad Traceback (most recent call last)\n");
        assert_eq!(report.test_results[0].error.as_deref(), Some("ValueError: bad"));
    }

    #[test]
    fn test_count_mismatch_becomes_warning() {
        let report = parse("Found 3 test(s)\nPASSED: test_a\n");
        assert_eq!(report.total_count, 3);
        assert_eq!(report.test_results.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.failure_summary(), "Test run did not complete");
    }

    #[test]
    fn test_fallback_success_marker() {
        let report = parse("SUCCESS: All tests passed\n");
        assert_eq!(report.test_results, vec![TestOutcome::pass("All tests")]);
        assert_eq!((report.passed_count, report.failed_count, report.total_count), (1, 0, 1));
    }

    #[test]
    fn test_fallback_load_error() {
        let report = parse("ERROR: Failed to load test code: ImportError: No module named 'x'\n");
        assert_eq!(
            report.test_results,
            vec![TestOutcome::fail("Test setup", "Failed to load test code")]
        );
        assert_eq!(report.failure_summary(), "Failed to load test code");
    }

    #[test]
    fn test_fallback_generic_error_uses_first_line() {
        let report = parse("\nERROR: No test functions found (functions must start with 'test_')\n");
        assert_eq!(
            report.test_results,
            vec![TestOutcome::fail(
                EXECUTION_OUTCOME,
                "ERROR: No test functions found (functions must start with 'test_')"
            )]
        );
    }

    #[test]
    fn test_fallback_skips_count_line() {
        let report = parse("Found 2 test(s)\nSegmentation fault\n");
        assert_eq!(report.test_results, vec![TestOutcome::fail(EXECUTION_OUTCOME, "Segmentation fault")]);
        assert_eq!(report.total_count, 2);
    }

    #[test]
    fn test_empty_output_still_yields_outcome() {
        let report = parse("");
        assert_eq!(report.test_results, vec![TestOutcome::fail(EXECUTION_OUTCOME, "Unknown error")]);
        assert_eq!(report.total_count, 1);
    }
}
