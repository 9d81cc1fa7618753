use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::types::DockerConfig;
use crate::error::{JudgeError, Result};
use crate::sandbox::harness;
use crate::sandbox::process::{run_with_timeout, ProcessOutcome};
use crate::sandbox::traits::{BackendCapabilities, SandboxBackend};
use crate::sandbox::workspace::Workspace;

/// Where the workspace is mounted inside the container
const GUEST_ROOT: &str = "/workspace";

/// Unprivileged uid:gid the harness runs as (nobody:nogroup)
const GUEST_USER: &str = "65534:65534";

/// Docker sandbox backend.
///
/// Every execution runs in a fresh `docker run --rm` container with no
/// network, dropped capabilities, a read-only root filesystem and the
/// workspace mounted read-only.
pub struct DockerBackend {
    image: String,
    python: String,
    memory_limit_mb: u64,
    pids_limit: u32,
    cpus: f64,
    passthrough_env: Vec<(String, String)>,
    max_output_bytes: usize,
}

impl DockerBackend {
    /// No network, memory/pid/cpu limits, read-only workspace mount.
    pub const CAPABILITIES: BackendCapabilities = BackendCapabilities {
        network_isolation: true,
        resource_limits: true,
        filesystem_isolation: true,
    };

    /// Create a new Docker backend.
    pub async fn new(
        config: &DockerConfig,
        passthrough_env: Vec<(String, String)>,
        max_output_bytes: usize,
    ) -> Result<Self> {
        // Verify Docker is available
        if !Self::is_available() {
            return Err(JudgeError::BackendNotAvailable {
                backend: "docker".to_string(),
                reason: "Docker daemon is not accessible. Ensure Docker is installed and running."
                    .to_string(),
            });
        }

        Self::ensure_image(&config.image, config.pull_image).await?;

        info!(image = %config.image, "Docker backend initialized");

        Ok(Self {
            image: config.image.clone(),
            python: config.python.clone(),
            memory_limit_mb: config.memory_limit_mb,
            pids_limit: config.pids_limit,
            cpus: config.cpus,
            passthrough_env,
            max_output_bytes,
        })
    }

    /// Check if the Docker backend is available on this system.
    ///
    /// Returns true if Docker daemon is accessible.
    pub fn is_available() -> bool {
        match std::process::Command::new("docker")
            .args(["info"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    /// Check if a Docker image exists locally.
    async fn image_exists(image: &str) -> bool {
        match Command::new("docker")
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    /// Make sure `image` is present locally, pulling it when allowed.
    async fn ensure_image(image: &str, pull: bool) -> Result<()> {
        if Self::image_exists(image).await {
            return Ok(());
        }

        if !pull {
            return Err(JudgeError::BackendNotAvailable {
                backend: "docker".to_string(),
                reason: format!(
                    "Docker image '{}' not found. Set pull_image = true to fetch it, or run: docker pull {}",
                    image, image
                ),
            });
        }

        info!(image = %image, "Pulling Docker image...");

        let output = Command::new("docker")
            .args(["pull", image])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| JudgeError::SandboxInit(format!("Failed to run docker pull: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JudgeError::SandboxInit(format!(
                "Failed to pull Docker image: {}",
                stderr.trim()
            )));
        }

        info!(image = %image, "Docker image pulled");
        Ok(())
    }

    /// Arguments for `docker run` executing the harness of `workspace`.
    fn run_args(&self, container: &str, workspace: &Workspace) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container.to_string(),
            "--network=none".to_string(),
            format!("--memory={}m", self.memory_limit_mb),
            format!("--memory-swap={}m", self.memory_limit_mb),
            format!("--pids-limit={}", self.pids_limit),
            format!("--cpus={}", self.cpus),
            "--read-only".to_string(),
            "--tmpfs".to_string(),
            "/tmp:rw,noexec,nosuid,size=16m".to_string(),
            "--cap-drop=ALL".to_string(),
            "--security-opt=no-new-privileges".to_string(),
            "--user".to_string(),
            GUEST_USER.to_string(),
            "-v".to_string(),
            format!("{}:{}:ro", workspace.root().display(), GUEST_ROOT),
            "-w".to_string(),
            GUEST_ROOT.to_string(),
        ];

        // Environment variables
        for (key, value) in harness::environment(GUEST_ROOT) {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (key, value) in &self.passthrough_env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(self.image.clone());
        args.push(self.python.clone());
        args.push(format!("{}/{}", GUEST_ROOT, Workspace::harness_file_name()));
        args
    }

    /// Force-remove a container left behind by a killed `docker run` client.
    async fn remove_container(container: &str) {
        match Command::new("docker")
            .args(["rm", "-f", container])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                debug!(container = %container, "Container removed");
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(container = %container, error = %stderr.trim(), "Failed to remove container");
            }
            Err(e) => warn!(container = %container, error = %e, "Failed to run docker rm"),
        }
    }
}

#[async_trait]
impl SandboxBackend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    fn capabilities(&self) -> BackendCapabilities {
        Self::CAPABILITIES
    }

    fn search_root(&self, _workspace: &Workspace) -> String {
        GUEST_ROOT.to_string()
    }

    async fn prepare(&self, workspace: &Workspace) -> Result<()> {
        // The container user is not the owner of the host temp dir
        workspace.share_read_only().await
    }

    async fn run(&self, workspace: &Workspace, limit: Duration) -> Result<ProcessOutcome> {
        let container = workspace.id();
        debug!(container = %container, image = %self.image, "Running harness in Docker");

        let mut cmd = Command::new("docker");
        cmd.args(self.run_args(&container, workspace));

        let outcome = run_with_timeout(cmd, limit, self.max_output_bytes).await?;
        if matches!(outcome, ProcessOutcome::TimedOut { .. }) {
            // Killing the client does not stop the container
            Self::remove_container(&container).await;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::ModulePath;

    fn backend() -> DockerBackend {
        DockerBackend {
            image: "python:3.12-slim".to_string(),
            python: "python3".to_string(),
            memory_limit_mb: 128,
            pids_limit: 32,
            cpus: 0.5,
            passthrough_env: vec![("LANG".to_string(), "C.UTF-8".to_string())],
            max_output_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn test_run_args_isolate_the_container() {
        let base = tempfile::tempdir().unwrap();
        let module: ModulePath = "solution".parse().unwrap();
        let workspace = Workspace::create(Some(base.path()), &module, "x = 1\n")
            .await
            .unwrap();

        let args = backend().run_args("pyjudge-test", &workspace);
        for expected in [
            "--rm",
            "--network=none",
            "--memory=128m",
            "--pids-limit=32",
            "--cpus=0.5",
            "--read-only",
            "--cap-drop=ALL",
            "--security-opt=no-new-privileges",
            "PYTHONPATH=/workspace",
            "LANG=C.UTF-8",
        ] {
            assert!(args.iter().any(|a| a == expected), "missing {expected}");
        }

        let mount = format!("{}:/workspace:ro", workspace.root().display());
        assert!(args.contains(&mount));

        let tail: Vec<_> = args.iter().rev().take(3).rev().cloned().collect();
        assert_eq!(
            tail,
            ["python:3.12-slim", "python3", "/workspace/__harness__.py"]
        );
    }

    #[test]
    fn test_reports_full_isolation() {
        let caps = backend().capabilities();
        assert!(caps.network_isolation);
        assert!(caps.resource_limits);
        assert!(caps.filesystem_isolation);
    }
}
