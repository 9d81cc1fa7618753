//! Isolated execution of submissions: workspace, harness, backends.

mod backends;
mod factory;
mod harness;
mod launcher;
mod process;
mod traits;
mod workspace;

pub use backends::{DockerBackend, NativeBackend};
pub use factory::{available_backends, create_backend, BackendInfo};
pub use launcher::Launcher;
pub use process::ProcessOutcome;
pub use traits::{BackendCapabilities, SandboxBackend};
pub use workspace::Workspace;
