//! Static pre-execution gate for submitted Python source.
//!
//! Modules are allow-listed and builtins are deny-listed: the set of safe
//! modules is small and finite, the set of safe builtins is not. The gate runs
//! before any workspace or process exists and has no side effects.

mod tables;
mod validator;

use serde::{Deserialize, Serialize};

pub use tables::{is_allowed_import, ALLOWED_IMPORTS, DENIED_ATTRIBUTES, DENIED_OPERATIONS};
pub use validator::{check, PolicyViolation};

/// Outcome of running the policy gate over a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(violation: &PolicyViolation) -> Self {
        Self {
            allowed: false,
            reason: Some(violation.to_string()),
        }
    }
}

impl From<std::result::Result<(), PolicyViolation>> for PolicyDecision {
    fn from(result: std::result::Result<(), PolicyViolation>) -> Self {
        match result {
            Ok(()) => Self::allow(),
            Err(violation) => Self::deny(&violation),
        }
    }
}

/// Validate submitted source against the sandbox policy.
pub fn validate(source: &str) -> PolicyDecision {
    check(source).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_os_naming_module() {
        let decision = validate("import os");
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("os"));
    }

    #[test]
    fn test_validate_accepts_math() {
        assert_eq!(validate("import math\nprint(math.pi)"), PolicyDecision::allow());
    }

    #[test]
    fn test_validate_reports_syntax_error() {
        let decision = validate("def f(\n");
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("Syntax error"));
    }
}
