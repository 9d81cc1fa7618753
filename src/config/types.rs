use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{JudgeError, Result};
use crate::submission::{DEFAULT_MAX_CODE_LENGTH, DEFAULT_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub sandbox: SandboxConfig,
    pub catalog: CatalogConfig,
}

impl JudgeConfig {
    /// Reject values that would make every execution fail.
    pub fn validate(&self) -> Result<()> {
        let sandbox = &self.sandbox;
        if sandbox.timeout_seconds == 0 {
            return Err(JudgeError::Config(
                "sandbox.timeout_seconds must be positive".to_string(),
            ));
        }
        if sandbox.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(JudgeError::Config(format!(
                "sandbox.timeout_seconds must be at most {}",
                MAX_TIMEOUT_SECONDS
            )));
        }
        if sandbox.max_concurrency == 0 {
            return Err(JudgeError::Config(
                "sandbox.max_concurrency must be positive".to_string(),
            ));
        }
        if sandbox.max_code_length == 0 {
            return Err(JudgeError::Config(
                "sandbox.max_code_length must be positive".to_string(),
            ));
        }
        if sandbox.native.python.trim().is_empty() || sandbox.docker.python.trim().is_empty() {
            return Err(JudgeError::Config(
                "python interpreter name must not be empty".to_string(),
            ));
        }
        if sandbox.docker.cpus.is_nan() || sandbox.docker.cpus <= 0.0 {
            return Err(JudgeError::Config(
                "sandbox.docker.cpus must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// The type of sandbox backend to use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Host Python interpreter as a direct child process
    Native,
    /// Throwaway Docker container per execution
    Docker,
    /// Docker when preferred and reachable, otherwise native
    #[default]
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Which backend to use
    pub backend: BackendType,
    /// Default wall-clock bound per execution, in seconds
    pub timeout_seconds: u64,
    /// Executions allowed to run at once
    pub max_concurrency: usize,
    /// Longest accepted learner source, in characters
    pub max_code_length: usize,
    /// Captured output beyond this many bytes is dropped
    pub max_output_bytes: usize,
    /// Parent directory for workspaces (system temp dir if unset)
    pub workspace_dir: Option<PathBuf>,
    /// Host environment variables forwarded to the child
    pub passthrough_env: Vec<String>,
    /// Native backend configuration
    pub native: NativeConfig,
    /// Docker-specific configuration
    pub docker: DockerConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_concurrency: 4,
            max_code_length: DEFAULT_MAX_CODE_LENGTH,
            max_output_bytes: 1024 * 1024,
            workspace_dir: None,
            passthrough_env: Vec::new(),
            native: NativeConfig::default(),
            docker: DockerConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// Values of `passthrough_env` that are set on the host.
    pub fn host_passthrough(&self) -> Vec<(String, String)> {
        self.passthrough_env
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
            .collect()
    }
}

/// Native backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    /// Interpreter name or path, resolved on PATH
    pub python: String,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
        }
    }
}

/// Docker-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Image the harness runs in
    pub image: String,
    /// Interpreter inside the image
    pub python: String,
    /// Memory limit in MB
    pub memory_limit_mb: u64,
    /// Maximum number of processes in the container
    pub pids_limit: u32,
    /// CPU quota (fractional cores)
    pub cpus: f64,
    /// Let `auto` pick Docker when the daemon is reachable
    pub prefer: bool,
    /// Pull the image if it is missing locally (default: true)
    pub pull_image: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image: "python:3.12-slim".to_string(),
            python: "python3".to_string(),
            memory_limit_mb: 256,
            pids_limit: 64,
            cpus: 1.0,
            prefer: false,
            pull_image: true,
        }
    }
}

/// Problem catalog configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory of problem TOML files (defaults to `<data dir>/problems`)
    pub dir: Option<PathBuf>,
}
