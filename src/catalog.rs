//! File-backed problem catalog: one TOML file per problem.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{JudgeError, Result};
use crate::submission::Submission;

/// A practice problem and the hidden tests that judge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Defaults to the file stem when omitted.
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub function_name: String,
    pub starter_code: String,
    pub test_code: String,
}

impl Problem {
    /// Dotted module the tests import the solution from, e.g.
    /// `arrays_and_strings.clone_even_numbers`.
    pub fn module_path(&self) -> String {
        format!("{}.{}", self.category.replace('-', "_"), self.function_name)
    }

    /// Pair learner code with this problem's tests.
    pub fn submission(&self, user_code: impl Into<String>) -> Result<Submission> {
        Submission::new(user_code, self.test_code.clone(), &self.module_path())
    }
}

#[derive(Debug, Default)]
pub struct ProblemCatalog {
    problems: BTreeMap<String, Problem>,
}

impl ProblemCatalog {
    /// Load every `*.toml` file in `dir`. A missing directory is an empty
    /// catalog.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            debug!(dir = %dir.display(), "Catalog directory does not exist");
            return Ok(Self::default());
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read catalog directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        let mut problems = BTreeMap::new();
        for path in files {
            let problem = load_problem(&path)?;
            if let Some(previous) = problems.insert(problem.id.clone(), problem) {
                return Err(anyhow::anyhow!(
                    "Duplicate problem id '{}' in {}",
                    previous.id,
                    path.display()
                )
                .into());
            }
        }

        info!(dir = %dir.display(), count = problems.len(), "Problem catalog loaded");
        Ok(Self { problems })
    }

    pub fn get(&self, id: &str) -> Result<&Problem> {
        self.problems
            .get(id)
            .ok_or_else(|| JudgeError::ProblemNotFound { id: id.to_string() })
    }

    /// Problems sorted by id, optionally restricted to one category.
    pub fn list(&self, category: Option<&str>) -> Vec<&Problem> {
        self.problems
            .values()
            .filter(|problem| category.map_or(true, |c| problem.category == c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

fn load_problem(path: &Path) -> anyhow::Result<Problem> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read problem file {}", path.display()))?;
    let mut problem: Problem = toml::from_str(&content)
        .with_context(|| format!("Invalid problem file {}", path.display()))?;

    if problem.id.is_empty() {
        problem.id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    problem
        .module_path()
        .parse::<crate::submission::ModulePath>()
        .with_context(|| format!("Invalid category or function name in {}", path.display()))?;
    if problem.test_code.trim().is_empty() {
        bail!("Problem {} has no test code", path.display());
    }

    Ok(problem)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLONE_EVEN: &str = r#"
title = "Clone Even Numbers"
description = "Clone all even numbers in-place."
category = "arrays-and-strings"
function_name = "clone_even_numbers"
starter_code = """
def clone_even_numbers(arr):
    pass
"""
test_code = """
from arrays_and_strings.clone_even_numbers import clone_even_numbers

def test_empty_array():
    assert clone_even_numbers([]) == []
"""
"#;

    #[test]
    fn test_load_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clone-even.toml"), CLONE_EVEN).unwrap();
        std::fs::write(
            dir.path().join("a-first.toml"),
            CLONE_EVEN
                .replace("arrays-and-strings", "math")
                .replace("Clone Even Numbers", "First"),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = ProblemCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);

        let problem = catalog.get("clone-even").unwrap();
        assert_eq!(problem.title, "Clone Even Numbers");
        assert_eq!(problem.module_path(), "arrays_and_strings.clone_even_numbers");

        let ids: Vec<_> = catalog.list(None).iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a-first", "clone-even"]);
        assert_eq!(catalog.list(Some("math")).len(), 1);
        assert!(catalog.list(Some("graphs")).is_empty());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ProblemCatalog::load(&dir.path().join("nope")).unwrap();
        assert!(catalog.is_empty());
        assert!(matches!(
            catalog.get("anything"),
            Err(JudgeError::ProblemNotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.toml"), "title = ").unwrap();

        let err = ProblemCatalog::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_submission_uses_problem_tests() {
        let problem: Problem = toml::from_str(CLONE_EVEN).unwrap();
        let submission = problem.submission("def clone_even_numbers(arr):\n    return arr\n").unwrap();
        assert_eq!(
            submission.module_path().to_string(),
            "arrays_and_strings.clone_even_numbers"
        );
        assert_eq!(submission.test_code(), problem.test_code);
    }
}
