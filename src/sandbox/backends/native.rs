use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::types::NativeConfig;
use crate::error::{JudgeError, Result};
use crate::sandbox::harness;
use crate::sandbox::process::{run_with_timeout, ProcessOutcome};
use crate::sandbox::traits::{BackendCapabilities, SandboxBackend};
use crate::sandbox::workspace::Workspace;

/// Native process backend.
///
/// Runs the harness with a host Python interpreter as a direct child process.
/// Isolation comes from the separate process, a cleared environment and the
/// wall-clock bound.
pub struct NativeBackend {
    python: PathBuf,
    passthrough_env: Vec<(String, String)>,
    max_output_bytes: usize,
}

impl NativeBackend {
    pub const CAPABILITIES: BackendCapabilities = BackendCapabilities {
        network_isolation: false,
        resource_limits: false,
        filesystem_isolation: false,
    };

    /// Create a new native backend, resolving the interpreter on `PATH`.
    pub fn new(
        config: &NativeConfig,
        passthrough_env: Vec<(String, String)>,
        max_output_bytes: usize,
    ) -> Result<Self> {
        let python = which::which(&config.python).map_err(|e| JudgeError::BackendNotAvailable {
            backend: "native".to_string(),
            reason: format!("Python interpreter '{}' not found: {}", config.python, e),
        })?;

        info!(python = %python.display(), "Native backend initialized");

        Ok(Self {
            python,
            passthrough_env,
            max_output_bytes,
        })
    }

    /// Check if the configured interpreter can be found.
    pub fn is_available(config: &NativeConfig) -> bool {
        which::which(&config.python).is_ok()
    }
}

#[async_trait]
impl SandboxBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn capabilities(&self) -> BackendCapabilities {
        Self::CAPABILITIES
    }

    fn search_root(&self, workspace: &Workspace) -> String {
        workspace.root().display().to_string()
    }

    async fn run(&self, workspace: &Workspace, limit: Duration) -> Result<ProcessOutcome> {
        debug!(root = %workspace.root().display(), "Running harness natively");

        let mut cmd = Command::new(&self.python);
        cmd.arg(workspace.harness_path());
        cmd.current_dir(workspace.root());

        cmd.env_clear();
        for (key, value) in harness::environment(&self.search_root(workspace)) {
            cmd.env(key, value);
        }
        for (key, value) in &self.passthrough_env {
            cmd.env(key, value);
        }

        run_with_timeout(cmd, limit, self.max_output_bytes).await
    }
}
