//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// feedkit - package source client
///
/// Discovers what a package source offers, lists packages installed in a
/// local packages folder and downloads package archives.
#[derive(Parser, Debug)]
#[command(name = "feedkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FEEDKIT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the resources a source advertises
    Resources(ResourcesArgs),

    /// List installed versions of a package in a local packages folder
    List(ListArgs),

    /// Download a package archive and print its hash
    Download(DownloadArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the resources command
#[derive(Parser, Debug)]
pub struct ResourcesArgs {
    /// Source name from the config, or a URL or folder
    pub source: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Package id (case-insensitive)
    pub id: String,

    /// Packages folder (defaults to cache.global_packages_folder)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the download command
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Source name from the config, or a URL or folder
    pub source: String,

    /// Package id
    pub id: String,

    /// Package version
    #[arg(value_name = "VERSION")]
    pub package_version: String,

    /// Destination file (defaults to {id}.{version}.nupkg in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Hash algorithm to print (SHA512 or SHA256)
    #[arg(long)]
    pub hash_algorithm: Option<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
