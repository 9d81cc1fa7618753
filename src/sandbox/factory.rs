use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::types::{BackendType, SandboxConfig};
use crate::error::{JudgeError, Result};
use crate::sandbox::backends::{DockerBackend, NativeBackend};
use crate::sandbox::traits::{BackendCapabilities, SandboxBackend};

/// Create a sandbox backend based on the configuration.
///
/// This factory function selects and instantiates the appropriate backend
/// based on the configured backend type and what the host provides.
pub async fn create_backend(config: &SandboxConfig) -> Result<Arc<dyn SandboxBackend>> {
    let backend_type = resolve_backend_type(config)?;
    let passthrough = config.host_passthrough();

    match backend_type {
        BackendType::Native => {
            let backend = NativeBackend::new(&config.native, passthrough, config.max_output_bytes)?;
            Ok(Arc::new(backend))
        }

        BackendType::Docker => {
            let backend =
                DockerBackend::new(&config.docker, passthrough, config.max_output_bytes).await?;
            Ok(Arc::new(backend))
        }

        BackendType::Auto => Err(JudgeError::SandboxInit(
            "backend selection did not resolve".to_string(),
        )),
    }
}

/// Resolve the backend type, handling Auto selection.
fn resolve_backend_type(config: &SandboxConfig) -> Result<BackendType> {
    match config.backend {
        BackendType::Auto => {
            // Priority: Docker (only when preferred) > Native
            if config.docker.prefer && DockerBackend::is_available() {
                debug!("Auto-selected docker backend");
                return Ok(BackendType::Docker);
            }

            if NativeBackend::is_available(&config.native) {
                debug!("Auto-selected native backend");
                return Ok(BackendType::Native);
            }

            Err(JudgeError::BackendNotAvailable {
                backend: "auto".to_string(),
                reason: "No sandbox backends available".to_string(),
            })
        }
        BackendType::Docker => {
            if !DockerBackend::is_available() {
                return Err(JudgeError::BackendNotAvailable {
                    backend: "docker".to_string(),
                    reason: "Docker daemon is not accessible. Ensure Docker is installed and running."
                        .to_string(),
                });
            }
            Ok(BackendType::Docker)
        }
        BackendType::Native => Ok(BackendType::Native),
    }
}

/// Get information about available backends on this system.
pub fn available_backends(config: &SandboxConfig) -> Vec<BackendInfo> {
    let native = NativeBackend::is_available(&config.native);
    let docker = DockerBackend::is_available();

    vec![
        BackendInfo {
            name: "native",
            available: native,
            description: "Host Python interpreter in a child process",
            capabilities: NativeBackend::CAPABILITIES,
            unavailable_reason: if native {
                None
            } else {
                Some("Python interpreter not found on PATH")
            },
        },
        BackendInfo {
            name: "docker",
            available: docker,
            description: "Throwaway Docker container per execution",
            capabilities: DockerBackend::CAPABILITIES,
            unavailable_reason: if docker {
                None
            } else {
                Some("Docker daemon not accessible")
            },
        },
    ]
}

/// Information about a sandbox backend.
#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub name: &'static str,
    pub available: bool,
    pub description: &'static str,
    pub capabilities: BackendCapabilities,
    pub unavailable_reason: Option<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::NativeConfig;

    #[test]
    fn test_explicit_native_resolves_without_probing() {
        let config = SandboxConfig {
            backend: BackendType::Native,
            ..SandboxConfig::default()
        };
        assert_eq!(resolve_backend_type(&config).unwrap(), BackendType::Native);
    }

    #[test]
    fn test_auto_without_interpreter_or_preference_fails() {
        let config = SandboxConfig {
            native: NativeConfig {
                python: "pyjudge-no-such-interpreter".to_string(),
            },
            ..SandboxConfig::default()
        };
        assert!(matches!(
            resolve_backend_type(&config),
            Err(JudgeError::BackendNotAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_not_available() {
        let config = SandboxConfig {
            backend: BackendType::Native,
            native: NativeConfig {
                python: "pyjudge-no-such-interpreter".to_string(),
            },
            ..SandboxConfig::default()
        };
        assert!(matches!(
            create_backend(&config).await,
            Err(JudgeError::BackendNotAvailable { .. })
        ));

        let info = available_backends(&config);
        assert_eq!(info[0].name, "native");
        assert!(!info[0].available);
        assert!(info[0].unavailable_reason.is_some());
    }

    #[test]
    fn test_listing_reports_isolation() {
        let info = available_backends(&SandboxConfig::default());
        let native = info.iter().find(|b| b.name == "native").unwrap();
        let docker = info.iter().find(|b| b.name == "docker").unwrap();

        assert!(native.capabilities.labels().is_empty());
        assert_eq!(docker.capabilities.labels(), ["network", "limits", "filesystem"]);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json[1]["capabilities"]["network_isolation"], true);
        assert_eq!(json[0]["capabilities"]["filesystem_isolation"], false);
    }
}
