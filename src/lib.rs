pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod policy;
pub mod report;
pub mod sandbox;
pub mod submission;

pub use error::{JudgeError, Result};
pub use report::{ExecutionResult, TestOutcome};
pub use sandbox::Launcher;
pub use submission::Submission;
