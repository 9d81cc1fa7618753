use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::types::BackendType;

#[derive(Parser, Debug)]
#[clap(name = "pyjudge")]
#[clap(version, about = "Sandboxed judge for Python practice submissions")]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub global_opts: GlobalOpts,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Configuration file path
    #[clap(short, long, global = true, env = "PYJUDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[clap(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,

    /// Sandbox backend (overrides the configured one)
    #[clap(long, global = true, value_enum)]
    pub backend: Option<BackendType>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check source against the sandbox policy without running it
    Check(CheckArgs),

    /// Run a solution against a test file
    Run(RunArgs),

    /// Run a solution against a catalog problem's hidden tests
    Solve(SolveArgs),

    /// Run many submissions from a JSON Lines file
    Batch(BatchArgs),

    /// List catalog problems
    Problems(ProblemsArgs),

    /// Show a catalog problem
    Show(ShowArgs),

    /// List sandbox backends and their availability
    Backends,

    /// Print the import allow-list and the deny-lists
    Policy,

    /// Initialize a new pyjudge configuration
    Init(InitArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

// ============================================================================
// Judging Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Python source file ("-" for stdin)
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Solution source file ("-" for stdin)
    pub solution: PathBuf,

    /// File with the test_* functions
    #[clap(long, short = 't')]
    pub tests: PathBuf,

    /// Dotted module path the tests import the solution from
    #[clap(long, short = 'm', default_value = "solution")]
    pub module: String,

    /// Wall-clock limit in seconds (defaults to the configured value)
    #[clap(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SolveArgs {
    /// Problem id
    pub problem: String,

    /// Solution source file ("-" for stdin)
    pub solution: PathBuf,

    /// Wall-clock limit in seconds (defaults to the configured value)
    #[clap(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// JSON Lines file, one submission per line ("-" for stdin)
    pub input: PathBuf,
}

// ============================================================================
// Catalog Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct ProblemsArgs {
    /// Only list problems in this category
    #[clap(long)]
    pub category: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Problem id
    pub problem: String,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "pyjudge", "run", "sol.py", "--tests", "t.py", "--module", "pkg.sol", "--timeout",
            "3", "--format", "json",
        ]);
        assert_eq!(cli.global_opts.format, OutputFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.solution, PathBuf::from("sol.py"));
                assert_eq!(args.module, "pkg.sol");
                assert_eq!(args.timeout, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::parse_from(["pyjudge", "-vv", "backends", "--backend", "docker"]);
        assert_eq!(cli.global_opts.verbose, 2);
        assert_eq!(cli.global_opts.backend, Some(BackendType::Docker));
        assert!(matches!(cli.command, Commands::Backends));
    }
}
