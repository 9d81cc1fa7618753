use clap::Parser;

use pyjudge::cli::args::{Cli, Commands};
use pyjudge::cli::commands;
use pyjudge::config::loader::load_config;
use pyjudge::error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.global_opts.verbose);

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(if e.is_user_error() { 2 } else { 1 });
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.global_opts.config.clone();
    let format = cli.global_opts.format;

    // Commands that must work without a valid config file
    match cli.command {
        Commands::Init(args) => return commands::init(args, config_path.as_deref()).await,
        Commands::Check(args) => return commands::check(args, format).await,
        Commands::Policy => return commands::policy(format).await,
        _ => {}
    }

    // Load configuration (file + defaults)
    let mut config = load_config(config_path.as_deref())?;
    if let Some(backend) = cli.global_opts.backend.clone() {
        config.sandbox.backend = backend;
    }

    // Dispatch to subcommand handler
    match cli.command {
        Commands::Run(args) => commands::run(args, config, format).await,
        Commands::Solve(args) => commands::solve(args, config, format).await,
        Commands::Batch(args) => commands::batch(args, config, format).await,
        Commands::Problems(args) => commands::problems(args, config, format).await,
        Commands::Show(args) => commands::show(args, config, format).await,
        Commands::Backends => commands::backends(config, format).await,
        Commands::Config(args) => commands::config(args, config, config_path.as_deref()).await,
        Commands::Init(_) | Commands::Check(_) | Commands::Policy => Ok(()),
    }
}

fn init_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr; stdout carries results
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
