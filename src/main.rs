//! feedkit - package source client
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use feedkit::cli::{Cli, Commands};
use feedkit::config::{Config, ConfigManager};
use feedkit::error::FeedResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> FeedResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // A broken config file must not stop `config path` or `config init --force`
    let loaded = config_manager.load().await;
    let config = match (&cli.command, loaded) {
        (_, Ok(config)) => config,
        (Commands::Config(_), Err(e)) => {
            eprintln!("{} {}", style("Warning:").yellow(), e);
            Config::default()
        }
        (_, Err(e)) => return Err(e),
    };

    init_logging(cli.verbose, &config.general.log_format);
    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Resources(args) => feedkit::cli::commands::resources(args, &config).await,
        Commands::List(args) => feedkit::cli::commands::list(args, &config).await,
        Commands::Download(args) => feedkit::cli::commands::download(args, &config).await,
        Commands::Config(args) => feedkit::cli::commands::config(args, &config, &config_manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, format: &str) {
    let filter = match verbose {
        0 => EnvFilter::new("feedkit=warn"),
        1 => EnvFilter::new("feedkit=info"),
        _ => EnvFilter::new("feedkit=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
