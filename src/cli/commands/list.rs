//! List command - show installed versions of a package

use crate::cache::LocalMetadataCache;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::error::{FeedError, FeedResult};
use crate::local::{LocalPackageInfo, LocalRepositoryIndex};
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One installed version
#[derive(Debug, Serialize)]
struct PackageRow {
    id: String,
    version: String,
    installed: DateTime<Utc>,
    path: String,
}

impl From<&LocalPackageInfo> for PackageRow {
    fn from(info: &LocalPackageInfo) -> Self {
        Self {
            id: info.identity().id().to_string(),
            version: info.identity().version().to_string(),
            installed: info.last_write_time_utc(),
            path: info.path().display().to_string(),
        }
    }
}

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> FeedResult<()> {
    let root = args
        .root
        .unwrap_or_else(|| config.cache.global_packages_folder());
    debug!("Listing {} under {}", args.id, root.display());

    let rows = {
        let root = root.clone();
        let id = args.id.clone();
        tokio::task::spawn_blocking(move || {
            let index = LocalRepositoryIndex::new(root, Arc::new(LocalMetadataCache::new()));
            index
                .find_packages_by_id(&id)
                .iter()
                .map(|info| PackageRow::from(info.as_ref()))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| FeedError::Internal(format!("Package scan task failed: {}", e)))?
    };

    if rows.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!(
                "{} No versions of {} installed in {}",
                style("i").blue(),
                args.id,
                root.display()
            ),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&root, &rows),
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Plain => print_plain(&rows),
    }

    Ok(())
}

fn print_table(root: &Path, rows: &[PackageRow]) {
    println!("{}", style(root.display()).bold());
    println!();
    println!(
        "{:<40} {:<20} {:<17}",
        style("ID").bold(),
        style("VERSION").bold(),
        style("INSTALLED").bold()
    );
    println!("{}", "-".repeat(77));

    for row in rows {
        println!(
            "{:<40} {:<20} {:<17}",
            row.id,
            style(&row.version).green(),
            row.installed.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("{} version(s)", rows.len());
}

fn print_json(rows: &[PackageRow]) -> FeedResult<()> {
    let json = serde_json::to_string_pretty(rows)
        .map_err(|e| FeedError::Internal(format!("serializing packages: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn print_plain(rows: &[PackageRow]) {
    for row in rows {
        println!("{}", row.version);
    }
}
