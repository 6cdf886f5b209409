//! Configuration schema for feedkit
//!
//! Configuration is stored at `~/.config/feedkit/config.toml`

use crate::repository::PackageSource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP client settings
    pub http: HttpConfig,

    /// Download settings
    pub downloads: DownloadsConfig,

    /// Named package sources
    pub sources: Vec<PackageSource>,

    /// Local package folder settings
    pub cache: CacheConfig,
}

impl Config {
    /// Resolve a source argument: a configured source name (case-insensitive)
    /// or else a location used as-is
    pub fn resolve_source(&self, name_or_location: &str) -> PackageSource {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name_or_location))
            .cloned()
            .unwrap_or_else(|| PackageSource::from_location(name_or_location))
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overall request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent header override
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: crate::protocol::http::DEFAULT_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Concurrent downloads allowed through the shared throttle
    pub max_concurrent: usize,

    /// Hash algorithm printed after a download: "SHA512" or "SHA256"
    pub hash_algorithm: String,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            hash_algorithm: "SHA512".to_string(),
        }
    }
}

/// Local package folder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global packages folder (default: ~/.nuget/packages)
    pub global_packages_folder: Option<PathBuf>,
}

impl CacheConfig {
    /// The configured folder, or the default under the home directory
    pub fn global_packages_folder(&self) -> PathBuf {
        self.global_packages_folder.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".nuget")
                .join("packages")
        })
    }
}
