use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::sandbox::process::ProcessOutcome;
use crate::sandbox::workspace::Workspace;

/// Capability flags indicating what isolation the backend adds on top of
/// running a separate process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendCapabilities {
    /// The child has no network access
    pub network_isolation: bool,
    /// Memory and process-count limits are enforced
    pub resource_limits: bool,
    /// The child sees only the workspace, read-only
    pub filesystem_isolation: bool,
}

impl BackendCapabilities {
    /// Short names of the isolation features present.
    pub fn labels(&self) -> Vec<&'static str> {
        [
            (self.network_isolation, "network"),
            (self.resource_limits, "limits"),
            (self.filesystem_isolation, "filesystem"),
        ]
        .into_iter()
        .filter_map(|(present, label)| present.then_some(label))
        .collect()
    }
}

/// Trait for harness execution backends.
///
/// A backend knows how to start the harness in a workspace as an isolated
/// child process and wait for it under a wall-clock bound. Backends keep no
/// per-execution state, so one instance serves concurrent executions.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Returns the backend name (e.g., "native", "docker")
    fn name(&self) -> &str;

    /// Returns the capabilities of this backend
    fn capabilities(&self) -> BackendCapabilities;

    /// Path of the workspace root as seen from inside the child.
    fn search_root(&self, workspace: &Workspace) -> String;

    /// Hook run after the workspace is fully written and before `run`.
    async fn prepare(&self, _workspace: &Workspace) -> Result<()> {
        Ok(())
    }

    /// Run the workspace's harness, killing it once `limit` elapses.
    async fn run(&self, workspace: &Workspace, limit: Duration) -> Result<ProcessOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_follow_flags() {
        assert!(BackendCapabilities::default().labels().is_empty());
        let caps = BackendCapabilities {
            network_isolation: true,
            resource_limits: false,
            filesystem_isolation: true,
        };
        assert_eq!(caps.labels(), ["network", "filesystem"]);
        assert_eq!(
            serde_json::to_value(&caps).unwrap(),
            serde_json::json!({
                "network_isolation": true,
                "resource_limits": false,
                "filesystem_isolation": true,
            })
        );
    }
}
