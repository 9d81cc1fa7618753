use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::ProblemCatalog;
use crate::cli::args::{
    BatchArgs, CheckArgs, ConfigAction, ConfigArgs, InitArgs, OutputFormat, ProblemsArgs,
    RunArgs, ShowArgs, SolveArgs,
};
use crate::config::loader::{catalog_dir, get_config_path};
use crate::config::types::JudgeConfig;
use crate::error::{JudgeError, Result};
use crate::policy::{self, ALLOWED_IMPORTS, DENIED_ATTRIBUTES, DENIED_OPERATIONS};
use crate::report::ExecutionResult;
use crate::sandbox::{available_backends, BackendCapabilities, Launcher};
use crate::submission::Submission;

// ============================================================================
// Judging Commands
// ============================================================================

/// Run the policy gate only
pub async fn check(args: CheckArgs, format: OutputFormat) -> Result<()> {
    let source = read_source(&args.file).await?;
    let decision = policy::validate(&source);

    match format {
        OutputFormat::Text => match &decision.reason {
            None => println!("OK"),
            Some(reason) => {
                println!("Rejected: {}", reason);
                std::process::exit(1);
            }
        },
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&decision)?);
        }
    }

    Ok(())
}

/// Run a solution against a local test file
pub async fn run(args: RunArgs, config: JudgeConfig, format: OutputFormat) -> Result<()> {
    info!(solution = %args.solution.display(), module = %args.module, "Running submission");

    let user_code = read_source(&args.solution).await?;
    let test_code = read_source(&args.tests).await?;
    let submission = Submission::new(user_code, test_code, &args.module)?;
    let submission = finish_submission(submission, args.timeout, &config)?;

    let launcher = Launcher::from_config(&config.sandbox).await?;
    let result = launcher.execute(&submission).await;

    output_execution_result(&result, format)
}

/// Run a solution against a catalog problem
pub async fn solve(args: SolveArgs, config: JudgeConfig, format: OutputFormat) -> Result<()> {
    info!(problem = %args.problem, "Solving catalog problem");

    let catalog = ProblemCatalog::load(&catalog_dir(&config))?;
    let problem = catalog.get(&args.problem)?;
    let submission = problem.submission(read_source(&args.solution).await?)?;
    let submission = finish_submission(submission, args.timeout, &config)?;

    let launcher = Launcher::from_config(&config.sandbox).await?;
    let result = launcher.execute(&submission).await;

    output_execution_result(&result, format)
}

/// One input line of `batch`.
#[derive(Debug, Deserialize)]
struct BatchEntry {
    id: Option<String>,
    code: String,
    /// Catalog problem providing tests and module path
    problem: Option<String>,
    tests: Option<String>,
    module: Option<String>,
    timeout: Option<u64>,
}

/// One output line of `batch`.
#[derive(Debug, Serialize)]
struct BatchRecord {
    id: String,
    started_at: DateTime<Utc>,
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run many submissions concurrently, reporting in input order
pub async fn batch(args: BatchArgs, config: JudgeConfig, format: OutputFormat) -> Result<()> {
    let input = read_source(&args.input).await?;
    let lines: Vec<(usize, &str)> = input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| (index + 1, line))
        .collect();

    let entries: Vec<(String, std::result::Result<BatchEntry, String>)> = lines
        .into_iter()
        .map(|(number, line)| match serde_json::from_str::<BatchEntry>(line) {
            Ok(entry) => (
                entry.id.clone().unwrap_or_else(|| format!("line-{}", number)),
                Ok(entry),
            ),
            Err(e) => (format!("line-{}", number), Err(format!("Invalid entry: {}", e))),
        })
        .collect();

    let catalog = if entries
        .iter()
        .any(|(_, entry)| matches!(entry, Ok(e) if e.problem.is_some()))
    {
        Some(ProblemCatalog::load(&catalog_dir(&config))?)
    } else {
        None
    };

    let launcher = Arc::new(Launcher::from_config(&config.sandbox).await?);
    info!(
        count = entries.len(),
        backend = launcher.backend_name(),
        "Running batch"
    );

    let mut records: Vec<Option<BatchRecord>> = Vec::with_capacity(entries.len());
    let mut tasks = tokio::task::JoinSet::new();

    for (index, (id, entry)) in entries.into_iter().enumerate() {
        records.push(None);
        let started_at = Utc::now();

        let submission = entry.and_then(|entry| {
            batch_submission(entry, catalog.as_ref(), &config).map_err(|e| e.to_string())
        });

        match submission {
            Ok(submission) => {
                let launcher = Arc::clone(&launcher);
                tasks.spawn(async move {
                    let started = Instant::now();
                    let result = launcher.execute(&submission).await;
                    let record = BatchRecord {
                        id,
                        started_at,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        result: Some(result),
                        error: None,
                    };
                    (index, record)
                });
            }
            Err(error) => {
                warn!(id = %id, error = %error, "Skipping batch entry");
                records[index] = Some(BatchRecord {
                    id,
                    started_at,
                    elapsed_ms: 0,
                    result: None,
                    error: Some(error),
                });
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        let (index, record) = joined.map_err(|e| anyhow::anyhow!("batch task failed: {}", e))?;
        records[index] = Some(record);
    }

    let records: Vec<BatchRecord> = records.into_iter().flatten().collect();
    let mut all_passed = true;

    for record in &records {
        let passed = record.result.as_ref().is_some_and(|r| r.success);
        all_passed &= passed;

        match format {
            OutputFormat::Text => {
                let summary = match (&record.result, &record.error) {
                    (Some(result), _) => format!(
                        "{} {}/{} passed",
                        if result.success { "PASS" } else { "FAIL" },
                        result.passed_count,
                        result.total_count
                    ),
                    (None, Some(error)) => format!("ERROR {}", error),
                    (None, None) => "ERROR".to_string(),
                };
                println!(
                    "{:<16} {:<24} {:>8}",
                    record.id,
                    summary,
                    format_elapsed(record.elapsed_ms)
                );
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(record)?);
            }
        }
    }

    if format == OutputFormat::Text && !all_passed {
        std::process::exit(1);
    }

    Ok(())
}

fn batch_submission(
    entry: BatchEntry,
    catalog: Option<&ProblemCatalog>,
    config: &JudgeConfig,
) -> Result<Submission> {
    let submission = match (&entry.problem, catalog) {
        (Some(problem), Some(catalog)) => catalog.get(problem)?.submission(entry.code)?,
        _ => {
            let tests = entry.tests.ok_or_else(|| {
                JudgeError::InvalidSubmission(
                    "Entry needs either 'problem' or 'tests'".to_string(),
                )
            })?;
            let module = entry.module.as_deref().unwrap_or("solution");
            Submission::new(entry.code, tests, module)?
        }
    };
    finish_submission(submission, entry.timeout, config)
}

/// Apply the configured timeout and length cap.
fn finish_submission(
    submission: Submission,
    timeout: Option<u64>,
    config: &JudgeConfig,
) -> Result<Submission> {
    let submission =
        submission.with_timeout(timeout.unwrap_or(config.sandbox.timeout_seconds))?;
    submission.ensure_length(config.sandbox.max_code_length)?;
    Ok(submission)
}

// ============================================================================
// Catalog Commands
// ============================================================================

pub async fn problems(args: ProblemsArgs, config: JudgeConfig, format: OutputFormat) -> Result<()> {
    let dir = catalog_dir(&config);
    let catalog = ProblemCatalog::load(&dir)?;
    let problems = catalog.list(args.category.as_deref());

    match format {
        OutputFormat::Text => {
            if problems.is_empty() {
                println!("{}", empty_listing(&catalog, args.category.as_deref(), &dir));
            } else {
                println!("{:<28} {:<24} TITLE", "ID", "CATEGORY");
                println!("{}", "-".repeat(70));

                let shown = problems.len();
                for problem in problems {
                    println!(
                        "{:<28} {:<24} {}",
                        problem.id, problem.category, problem.title
                    );
                }
                if shown < catalog.len() {
                    println!();
                    println!("{} of {} problems shown", shown, catalog.len());
                }
            }
        }
        OutputFormat::Json => {
            let json_problems: Vec<_> = problems
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id,
                        "title": p.title,
                        "category": p.category,
                        "function_name": p.function_name,
                    })
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&json_problems)?);
        }
    }

    Ok(())
}

pub async fn show(args: ShowArgs, config: JudgeConfig, format: OutputFormat) -> Result<()> {
    let catalog = ProblemCatalog::load(&catalog_dir(&config))?;
    let problem = catalog.get(&args.problem)?;

    match format {
        OutputFormat::Text => {
            println!("{} ({})", problem.title, problem.category);
            println!();
            println!("{}", problem.description.trim());
            println!();
            println!("Module: {}", problem.module_path());
            println!();
            print!("{}", problem.starter_code.trim_start());
        }
        OutputFormat::Json => {
            // Hidden tests stay hidden
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "id": problem.id,
                    "title": problem.title,
                    "description": problem.description,
                    "category": problem.category,
                    "function_name": problem.function_name,
                    "module_path": problem.module_path(),
                    "starter_code": problem.starter_code,
                }))?
            );
        }
    }

    Ok(())
}

// ============================================================================
// Sandbox Commands
// ============================================================================

pub async fn backends(config: JudgeConfig, format: OutputFormat) -> Result<()> {
    let backends = available_backends(&config.sandbox);

    match format {
        OutputFormat::Text => {
            println!(
                "{:<10} {:<10} {:<27} DESCRIPTION",
                "BACKEND", "STATUS", "ISOLATION"
            );
            println!("{}", "-".repeat(90));
            for backend in &backends {
                let status = if backend.available {
                    "available"
                } else {
                    "missing"
                };
                let reason = backend
                    .unavailable_reason
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default();
                println!(
                    "{:<10} {:<10} {:<27} {}{}",
                    backend.name,
                    status,
                    isolation_summary(&backend.capabilities),
                    backend.description,
                    reason
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&backends)?);
        }
    }

    Ok(())
}

pub async fn policy(format: OutputFormat) -> Result<()> {
    let imports = sorted(&ALLOWED_IMPORTS);
    let operations = sorted(&DENIED_OPERATIONS);
    let attributes = sorted(&DENIED_ATTRIBUTES);

    match format {
        OutputFormat::Text => {
            println!("Allowed imports:    {}", imports.join(", "));
            println!("Denied operations:  {}", operations.join(", "));
            println!("Denied attributes:  {}", attributes.join(", "));
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "allowed_imports": imports,
                    "denied_operations": operations,
                    "denied_attributes": attributes,
                }))?
            );
        }
    }

    Ok(())
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn init(args: InitArgs, config_path: Option<&Path>) -> Result<()> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if config_path.exists() && !args.force {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    // Create parent directories if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write default configuration
    let default_config = JudgeConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| JudgeError::Config(e.to_string()))?;

    std::fs::write(&config_path, toml_str)?;

    println!("Created configuration at: {}", config_path.display());
    println!("\nQuick start:");
    println!("  # Check a solution against the sandbox policy");
    println!("  pyjudge check solution.py");
    println!();
    println!("  # Run it against your own tests");
    println!("  pyjudge run solution.py --tests test_solution.py --module solution");
    println!();
    println!("  # Or against a catalog problem");
    println!(
        "  pyjudge problems   (catalog: {})",
        catalog_dir(&default_config).display()
    );
    println!("  pyjudge solve clone-even-numbers solution.py");

    Ok(())
}

pub async fn config(args: ConfigArgs, config: JudgeConfig, config_path: Option<&Path>) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| JudgeError::Config(e.to_string()))?;
            println!("{}", toml_str);
        }
        ConfigAction::Path => {
            let path = config_path
                .map(PathBuf::from)
                .unwrap_or_else(get_config_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read a source file, or stdin for "-".
async fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let content = tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin()))
            .await
            .map_err(|e| anyhow::anyhow!("stdin reader failed: {}", e))??;
        return Ok(content);
    }

    tokio::fs::read_to_string(path).await.map_err(|e| {
        anyhow::anyhow!("Failed to read {}: {}", path.display(), e).into()
    })
}

fn output_execution_result(result: &ExecutionResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for outcome in &result.test_results {
                match &outcome.error {
                    None => println!("PASS  {}", outcome.name),
                    Some(error) => println!("FAIL  {}: {}", outcome.name, error),
                }
            }
            println!();
            println!(
                "{} passed, {} failed, {} total",
                result.passed_count, result.failed_count, result.total_count
            );
            for warning in &result.warnings {
                eprintln!("warning: {}", warning);
            }
            if let Some(error) = &result.error {
                eprintln!("{}", error);
            }
            // A failing verdict is a failing exit
            if !result.success {
                std::process::exit(1);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }
    Ok(())
}

/// Message for a `problems` listing that matched nothing.
fn empty_listing(catalog: &ProblemCatalog, category: Option<&str>, dir: &Path) -> String {
    match category {
        Some(category) if !catalog.is_empty() => format!(
            "No problems in category '{}' ({} in catalog)",
            category,
            catalog.len()
        ),
        _ => format!("No problems found in {}", dir.display()),
    }
}

fn isolation_summary(capabilities: &BackendCapabilities) -> String {
    let labels = capabilities.labels();
    if labels.is_empty() {
        "process only".to_string()
    } else {
        labels.join(", ")
    }
}

fn sorted(set: &HashSet<&'static str>) -> Vec<&'static str> {
    let mut items: Vec<_> = set.iter().copied().collect();
    items.sort_unstable();
    items
}

fn format_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m{}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(250), "250ms");
        assert_eq!(format_elapsed(2_500), "2.5s");
        assert_eq!(format_elapsed(125_000), "2m5s");
    }

    #[test]
    fn test_empty_listing_distinguishes_filter_from_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let empty = ProblemCatalog::load(dir.path()).unwrap();
        assert_eq!(
            empty_listing(&empty, Some("graphs"), dir.path()),
            format!("No problems found in {}", dir.path().display())
        );

        std::fs::write(
            dir.path().join("sum.toml"),
            "title = \"Sum\"\ncategory = \"math\"\nfunction_name = \"total\"\n\
             description = \"Add.\"\nstarter_code = \"\"\ntest_code = \"def test_a(): pass\"\n",
        )
        .unwrap();
        let catalog = ProblemCatalog::load(dir.path()).unwrap();
        assert_eq!(
            empty_listing(&catalog, Some("graphs"), dir.path()),
            "No problems in category 'graphs' (1 in catalog)"
        );
    }

    #[test]
    fn test_isolation_summary() {
        assert_eq!(isolation_summary(&BackendCapabilities::default()), "process only");
        let caps = BackendCapabilities {
            network_isolation: true,
            resource_limits: true,
            filesystem_isolation: false,
        };
        assert_eq!(isolation_summary(&caps), "network, limits");
    }

    #[test]
    fn test_finish_submission_applies_config() {
        let mut config = JudgeConfig::default();
        config.sandbox.timeout_seconds = 7;
        config.sandbox.max_code_length = 5;

        let short = Submission::new("x = 1", "", "solution").unwrap();
        assert_eq!(
            finish_submission(short.clone(), None, &config)
                .unwrap()
                .timeout_seconds(),
            7
        );
        assert_eq!(
            finish_submission(short, Some(2), &config)
                .unwrap()
                .timeout_seconds(),
            2
        );

        let long = Submission::new("x = 12345", "", "solution").unwrap();
        let err = finish_submission(long, None, &config).unwrap_err();
        assert_eq!(err.to_string(), "Code is too long (max 5 characters)");
    }

    #[test]
    fn test_batch_entry_needs_tests_or_problem() {
        let entry: BatchEntry = serde_json::from_str(r#"{"code": "x = 1"}"#).unwrap();
        let err = batch_submission(entry, None, &JudgeConfig::default()).unwrap_err();
        assert!(err.is_user_error());

        let entry: BatchEntry = serde_json::from_str(
            r#"{"id": "a", "code": "x = 1", "tests": "def test_a(): pass", "module": "pkg.sol"}"#,
        )
        .unwrap();
        let submission = batch_submission(entry, None, &JudgeConfig::default()).unwrap();
        assert_eq!(submission.module_path().to_string(), "pkg.sol");
    }

    #[test]
    fn test_batch_record_omits_missing_fields() {
        let record = BatchRecord {
            id: "line-3".to_string(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            result: None,
            error: Some("Invalid entry".to_string()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"], "Invalid entry");
        assert!(json["started_at"].is_string());
    }
}
