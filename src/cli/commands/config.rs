//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{FeedError, FeedResult};
use console::style;

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> FeedResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> FeedResult<()> {
    let toml = toml::to_string_pretty(config)
        .map_err(|e| FeedError::Internal(format!("serializing config: {}", e)))?;
    println!("{}", toml);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> FeedResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "{} Config already exists at {}",
            style("!").yellow(),
            path.display()
        );
        println!("  {}", style("Use --force to overwrite").dim());
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration initialized {}",
        style("✓").green(),
        style(path.display()).dim()
    );

    Ok(())
}
