//! Package sources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// How a source is accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// HTTP source whose location is a JSON service index
    ServiceIndex,
    /// Any other HTTP source, spoken to as an OData feed
    ODataFeed,
    /// A folder on disk
    LocalFolder,
}

impl FeedKind {
    pub fn name(&self) -> &'static str {
        match self {
            FeedKind::ServiceIndex => "service index",
            FeedKind::ODataFeed => "OData feed",
            FeedKind::LocalFolder => "local folder",
        }
    }
}

/// A named package source location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSource {
    pub name: String,
    pub location: String,
}

impl PackageSource {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }

    /// A source named after its location
    pub fn from_location(location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            name: location.clone(),
            location,
        }
    }

    /// The location as an HTTP(S) URL, if it is one
    pub fn http_url(&self) -> Option<Url> {
        Url::parse(&self.location)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
    }

    /// The location as a folder path, for local sources
    pub fn local_path(&self) -> Option<PathBuf> {
        match self.feed_kind() {
            FeedKind::LocalFolder => Some(match Url::parse(&self.location) {
                Ok(url) if url.scheme() == "file" => url
                    .to_file_path()
                    .unwrap_or_else(|_| PathBuf::from(&self.location)),
                _ => PathBuf::from(&self.location),
            }),
            _ => None,
        }
    }

    pub fn feed_kind(&self) -> FeedKind {
        match self.http_url() {
            Some(url) if url.path().to_ascii_lowercase().ends_with(".json") => FeedKind::ServiceIndex,
            Some(_) => FeedKind::ODataFeed,
            None => FeedKind::LocalFolder,
        }
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.location {
            write!(f, "{}", self.location)
        } else {
            write!(f, "{} ({})", self.name, self.location)
        }
    }
}
