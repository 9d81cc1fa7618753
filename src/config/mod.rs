pub mod loader;
pub mod types;

pub use loader::{catalog_dir, get_config_path, load_config};
pub use types::{BackendType, JudgeConfig, SandboxConfig};
