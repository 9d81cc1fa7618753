use std::fmt;
use std::str::FromStr;

use crate::error::{JudgeError, Result};

/// Default wall-clock bound for one execution.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

/// Largest wall-clock bound a submission or the configuration may ask for.
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

/// Default cap on learner source length, in characters.
pub const DEFAULT_MAX_CODE_LENGTH: usize = 10_000;

/// File stem reserved for the synthesized harness at the workspace root.
pub const HARNESS_STEM: &str = "__harness__";

/// A dotted Python module path such as `arrays_and_strings.clone_even_numbers`.
///
/// Every segment is a plain identifier, so joining segments onto a directory
/// can never escape it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModulePath {
    segments: Vec<String>,
}

impl ModulePath {
    /// Leading segments; each becomes a package directory.
    pub fn packages(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// Final segment; becomes `<leaf>.py`.
    pub fn leaf(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }
}

impl FromStr for ModulePath {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| JudgeError::InvalidModulePath {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("module path is empty"));
        }

        let segments: Vec<String> = s.split('.').map(str::to_string).collect();
        for segment in &segments {
            if !is_identifier(segment) {
                return Err(invalid(&format!("'{}' is not a valid identifier", segment)));
            }
        }

        if segments.len() == 1 && segments[0] == HARNESS_STEM {
            return Err(invalid("name is reserved for the test harness"));
        }

        Ok(Self { segments })
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One learner submission paired with the hidden test code it is judged by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    user_code: String,
    test_code: String,
    module_path: ModulePath,
    timeout_seconds: u64,
}

impl Submission {
    /// Build a submission with the default timeout.
    pub fn new(
        user_code: impl Into<String>,
        test_code: impl Into<String>,
        module_path: &str,
    ) -> Result<Self> {
        let user_code = user_code.into();
        if user_code.trim().is_empty() {
            return Err(JudgeError::InvalidSubmission(
                "Code cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            user_code,
            test_code: test_code.into(),
            module_path: module_path.parse()?,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        })
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Result<Self> {
        if timeout_seconds == 0 {
            return Err(JudgeError::InvalidSubmission(
                "Timeout must be a positive number of seconds".to_string(),
            ));
        }
        if timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(JudgeError::InvalidSubmission(format!(
                "Timeout must be at most {} seconds",
                MAX_TIMEOUT_SECONDS
            )));
        }
        self.timeout_seconds = timeout_seconds;
        Ok(self)
    }

    /// Enforce the caller-side length cap on learner code.
    pub fn ensure_length(&self, max_chars: usize) -> Result<()> {
        if self.user_code.chars().count() > max_chars {
            return Err(JudgeError::InvalidSubmission(format!(
                "Code is too long (max {} characters)",
                max_chars
            )));
        }
        Ok(())
    }

    pub fn user_code(&self) -> &str {
        &self.user_code
    }

    pub fn test_code(&self) -> &str {
        &self.test_code
    }

    pub fn module_path(&self) -> &ModulePath {
        &self.module_path
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }
}
