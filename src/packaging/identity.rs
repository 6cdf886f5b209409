//! Package identity: an id plus a version

use super::version::PackageVersion;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An `(id, version)` pair.
///
/// Ids compare ordinally without regard to case; versions compare by
/// semantic-version precedence. The casing a caller supplied is kept for
/// display.
#[derive(Debug, Clone)]
pub struct PackageIdentity {
    id: String,
    version: PackageVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &PackageVersion {
        &self.version
    }

    /// Lower-cased id used for cache keys and folder names
    pub fn normalized_id(&self) -> String {
        self.id.to_ascii_lowercase()
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq_ignore_ascii_case(&other.id) && self.version == other.version
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.id.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        self.version.hash(state);
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
