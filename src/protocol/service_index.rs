//! Service index documents
//!
//! A service index lists the capability endpoints a source exposes:
//!
//! ```json
//! {
//!   "version": "3.0.0",
//!   "resources": [
//!     { "@id": "https://example.org/flat/", "@type": "PackageBaseAddress/3.0.0" },
//!     { "@id": "https://example.org/v2/", "@type": ["A", "B"], "clientVersion": "4.0.0" }
//!   ]
//! }
//! ```
//!
//! Entries without a `clientVersion` are treated as compatible with every
//! client from 0.0.0 upwards.

use crate::error::{FeedError, FeedResult};
use semver::Version;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::warn;
use url::Url;

/// Capability type of the flat-container content endpoint
pub const PACKAGE_BASE_ADDRESS: &str = "PackageBaseAddress/3.0.0";

const MISSING_VERSION: &str = "The source does not have the 'version' property.";
const UNSUPPORTED_VERSION: &str = "The source version is not supported";

/// One endpoint advertised by a service index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityEntry {
    pub capability_type: String,
    pub uri: Url,
    /// `None` when the entry carries no `clientVersion`
    pub compatible_versions: Option<Vec<Version>>,
}

impl CapabilityEntry {
    /// Highest advertised client version not above `requested`, ignoring
    /// build metadata
    fn best_compatible(&self, requested: &Version) -> Option<Version> {
        const UNVERSIONED: Version = Version::new(0, 0, 0);
        match &self.compatible_versions {
            None => (UNVERSIONED.cmp_precedence(requested) != Ordering::Greater).then_some(UNVERSIONED),
            Some(versions) => versions
                .iter()
                .filter(|v| v.cmp_precedence(requested) != Ordering::Greater)
                .max_by(|a, b| a.cmp_precedence(b))
                .cloned(),
        }
    }
}

/// Parsed service index
#[derive(Debug, Clone)]
pub struct ServiceIndex {
    version: Version,
    entries: Vec<CapabilityEntry>,
}

impl ServiceIndex {
    /// Parse a service index document
    pub fn parse(json: &str) -> FeedResult<Self> {
        let document: Value = serde_json::from_str(json)
            .map_err(|e| FeedError::InvalidServiceIndex(format!("The source index is not valid JSON: {}", e)))?;

        let version = document
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| FeedError::InvalidServiceIndex(MISSING_VERSION.to_string()))?;
        let version = Version::parse(version).map_err(|e| {
            FeedError::InvalidServiceIndex(format!("{}: '{}' ({})", UNSUPPORTED_VERSION, version, e))
        })?;

        let entries = document
            .get("resources")
            .and_then(Value::as_array)
            .map(|resources| resources.iter().flat_map(parse_entries).collect())
            .unwrap_or_default();

        Ok(Self { version, entries })
    }

    /// Schema version of the document
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Every entry in document order, one per advertised type
    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    /// Endpoints for the first capability type that has a compatible entry.
    ///
    /// Within a type, only entries at the highest client version not above
    /// `client_version` are returned, in document order. Types are never
    /// merged: the next type is tried only when the previous one yields
    /// nothing.
    pub fn select_uris(&self, client_version: &Version, types: &[&str]) -> Vec<Url> {
        for capability_type in types {
            let candidates: Vec<(&CapabilityEntry, Version)> = self
                .entries
                .iter()
                .filter(|entry| entry.capability_type == *capability_type)
                .filter_map(|entry| {
                    entry
                        .best_compatible(client_version)
                        .map(|version| (entry, version))
                })
                .collect();

            let Some(best) = candidates
                .iter()
                .map(|(_, v)| v)
                .max_by(|a, b| a.cmp_precedence(b))
                .cloned()
            else {
                continue;
            };

            return candidates
                .into_iter()
                .filter(|(_, version)| version.cmp_precedence(&best) == Ordering::Equal)
                .map(|(entry, _)| entry.uri.clone())
                .collect();
        }
        Vec::new()
    }
}

/// A single string or an array of strings
fn string_values(value: Option<&Value>) -> Option<Vec<&str>> {
    match value? {
        Value::String(s) => Some(vec![s.as_str()]),
        Value::Array(items) => Some(items.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

fn parse_entries(resource: &Value) -> Vec<CapabilityEntry> {
    let Some(id) = resource.get("@id").and_then(Value::as_str) else {
        warn!("Skipping service index entry without '@id'");
        return Vec::new();
    };
    let uri = match Url::parse(id) {
        Ok(uri) => uri,
        Err(e) => {
            warn!("Skipping service index entry with invalid '@id' {}: {}", id, e);
            return Vec::new();
        }
    };

    let compatible_versions = match string_values(resource.get("clientVersion")) {
        None => None,
        Some(values) => {
            let mut versions = Vec::with_capacity(values.len());
            for value in values {
                match Version::parse(value) {
                    Ok(v) => versions.push(v),
                    Err(e) => {
                        warn!("Skipping service index entry {} with invalid clientVersion '{}': {}", id, value, e);
                        return Vec::new();
                    }
                }
            }
            Some(versions)
        }
    };

    string_values(resource.get("@type"))
        .unwrap_or_default()
        .into_iter()
        .map(|capability_type| CapabilityEntry {
            capability_type: capability_type.to_string(),
            uri: uri.clone(),
            compatible_versions: compatible_versions.clone(),
        })
        .collect()
}
