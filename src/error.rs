use thiserror::Error;

#[derive(Error, Debug)]
pub enum JudgeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    // Submission errors
    #[error("{0}")]
    InvalidSubmission(String),

    #[error("Invalid module path '{path}': {reason}")]
    InvalidModulePath { path: String, reason: String },

    // Catalog errors
    #[error("Problem not found: {id}")]
    ProblemNotFound { id: String },

    // Sandbox errors
    #[error("Sandbox initialization failed: {0}")]
    SandboxInit(String),

    #[error("Backend '{backend}' is not available: {reason}")]
    BackendNotAvailable { backend: String, reason: String },

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Failed to spawn sandbox process: {0}")]
    Spawn(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    // Generic wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JudgeError {
    /// Errors caused by the caller's input rather than the host.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSubmission(_) | Self::InvalidModulePath { .. } | Self::ProblemNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, JudgeError>;
