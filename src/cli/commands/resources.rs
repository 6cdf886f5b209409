//! Resources command - show what a source advertises

use crate::cli::args::{OutputFormat, ResourcesArgs};
use crate::config::Config;
use crate::error::{FeedError, FeedResult};
use crate::local::LocalRepositoryIndex;
use crate::protocol::ODataFeedResource;
use crate::repository::{FeedKind, PackageSource, ServiceIndexResource};
use console::style;
use serde::Serialize;

/// One advertised resource
#[derive(Debug, Serialize)]
struct ResourceRow {
    resource_type: String,
    uri: String,
    client_versions: Vec<String>,
}

/// Execute the resources command
pub async fn execute(args: ResourcesArgs, config: &Config) -> FeedResult<()> {
    let source = config.resolve_source(&args.source);
    let token = super::interrupt_token();
    let repository = super::repository_factory(config)?.create(source.clone());

    let rows = match source.feed_kind() {
        FeedKind::ServiceIndex => {
            let index = repository
                .get::<ServiceIndexResource>(&token)
                .await?
                .ok_or_else(|| unavailable(&source, "service index"))?;
            index
                .entries()
                .iter()
                .map(|entry| ResourceRow {
                    resource_type: entry.capability_type.clone(),
                    uri: entry.uri.to_string(),
                    client_versions: entry
                        .compatible_versions
                        .iter()
                        .flatten()
                        .map(|v| v.to_string())
                        .collect(),
                })
                .collect()
        }
        FeedKind::ODataFeed => {
            let feed = repository
                .get::<ODataFeedResource>(&token)
                .await?
                .ok_or_else(|| unavailable(&source, "OData feed"))?;
            vec![ResourceRow {
                resource_type: "ODataFeed".to_string(),
                uri: feed.base_address().to_string(),
                client_versions: Vec::new(),
            }]
        }
        FeedKind::LocalFolder => {
            let index = repository
                .get::<LocalRepositoryIndex>(&token)
                .await?
                .ok_or_else(|| unavailable(&source, "local repository"))?;
            vec![ResourceRow {
                resource_type: "LocalRepository".to_string(),
                uri: index.root().display().to_string(),
                client_versions: Vec::new(),
            }]
        }
    };

    match args.format {
        OutputFormat::Table => print_table(&source, &rows),
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Plain => print_plain(&rows),
    }

    Ok(())
}

fn unavailable(source: &PackageSource, what: &str) -> FeedError {
    FeedError::User(format!("No {} resource could be built for {}", what, source))
}

fn print_table(source: &PackageSource, rows: &[ResourceRow]) {
    println!("{} ({})", style(&source.name).bold(), source.feed_kind().name());
    println!();
    println!(
        "{:<40} {:<16} {}",
        style("TYPE").bold(),
        style("CLIENT").bold(),
        style("URI").bold()
    );
    println!("{}", "-".repeat(90));

    for row in rows {
        let versions = if row.client_versions.is_empty() {
            style("-".to_string()).dim()
        } else {
            style(row.client_versions.join(",")).cyan()
        };
        println!("{:<40} {:<16} {}", row.resource_type, versions, row.uri);
    }

    println!();
    println!("{} resource(s)", rows.len());
}

fn print_json(rows: &[ResourceRow]) -> FeedResult<()> {
    let json = serde_json::to_string_pretty(rows)
        .map_err(|e| FeedError::Internal(format!("serializing resources: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn print_plain(rows: &[ResourceRow]) {
    for row in rows {
        println!("{}\t{}", row.resource_type, row.uri);
    }
}
