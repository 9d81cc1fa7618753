use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::types::SandboxConfig;
use crate::error::Result;
use crate::policy;
use crate::report::ExecutionResult;
use crate::sandbox::factory::create_backend;
use crate::sandbox::harness;
use crate::sandbox::process::ProcessOutcome;
use crate::sandbox::traits::SandboxBackend;
use crate::sandbox::workspace::Workspace;
use crate::submission::Submission;

/// Runs submissions: policy gate, workspace, harness, backend, verdict.
///
/// Cloning is cheap and clones share the concurrency bound.
#[derive(Clone)]
pub struct Launcher {
    backend: Arc<dyn SandboxBackend>,
    workspace_dir: Option<PathBuf>,
    permits: Arc<Semaphore>,
}

impl Launcher {
    pub fn new(
        backend: Arc<dyn SandboxBackend>,
        workspace_dir: Option<PathBuf>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            backend,
            workspace_dir,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Build a launcher with the backend selected by `config`.
    pub async fn from_config(config: &SandboxConfig) -> Result<Self> {
        let backend = create_backend(config).await?;
        Ok(Self::new(
            backend,
            config.workspace_dir.clone(),
            config.max_concurrency,
        ))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Judge one submission. Never fails: every problem, from a policy
    /// violation to a missing interpreter, is reported in the result.
    pub async fn execute(&self, submission: &Submission) -> ExecutionResult {
        let module = submission.module_path().to_string();

        let decision = policy::validate(submission.user_code());
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_default();
            info!(module = %module, reason = %reason, "Submission rejected by policy");
            return ExecutionResult::rejected(reason);
        }

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => return ExecutionResult::infrastructure(e),
        };

        let started = Instant::now();
        let limit = Duration::from_secs(submission.timeout_seconds());
        debug!(module = %module, backend = self.backend.name(), "Starting execution");

        let result = match self.run_harness(submission, limit).await {
            Ok(ProcessOutcome::Exited { success, output, .. }) => {
                ExecutionResult::from_output(success, output)
            }
            Ok(ProcessOutcome::TimedOut { .. }) => {
                warn!(
                    module = %module,
                    timeout_seconds = submission.timeout_seconds(),
                    "Execution timed out"
                );
                ExecutionResult::timed_out(submission.timeout_seconds())
            }
            Err(e) => {
                warn!(module = %module, error = %e, "Execution failed");
                ExecutionResult::infrastructure(e)
            }
        };

        info!(
            module = %module,
            success = result.success,
            passed = result.passed_count,
            failed = result.failed_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Execution finished"
        );

        result
    }

    async fn run_harness(&self, submission: &Submission, limit: Duration) -> Result<ProcessOutcome> {
        let workspace = Workspace::create(
            self.workspace_dir.as_deref(),
            submission.module_path(),
            submission.user_code(),
        )
        .await?;

        let outcome = self.run_in(&workspace, submission, limit).await;
        workspace.close();
        outcome
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        submission: &Submission,
        limit: Duration,
    ) -> Result<ProcessOutcome> {
        let program = harness::render(submission.test_code(), &self.backend.search_root(workspace))?;
        workspace.write_harness(&program).await?;
        self.backend.prepare(workspace).await?;
        self.backend.run(workspace, limit).await
    }
}
