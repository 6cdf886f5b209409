//! Package versions
//!
//! Package folders and manifests carry versions that are looser than strict
//! semver: one to four numeric parts, a pre-release label compared without
//! regard to case, and build metadata that never affects equality. The
//! textual form found on disk or in a manifest is kept for display.

use crate::error::{FeedError, FeedResult};
use semver::Prerelease;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A package version with semantic-version precedence
#[derive(Debug, Clone)]
pub struct PackageVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    /// Lower-cased pre-release label (empty for a release)
    pre: Prerelease,
    /// Build metadata as written, ignored by comparisons
    metadata: Option<String>,
    /// The text this version was parsed from
    original: String,
}

impl PackageVersion {
    /// Create a release version from numeric parts
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            pre: Prerelease::EMPTY,
            metadata: None,
            original: format!("{}.{}.{}", major, minor, patch),
        }
    }

    /// Parse a version such as `1.0`, `1.0.0-Beta.2` or `1.2.3.4+sha.abc`
    pub fn parse(value: &str) -> FeedResult<Self> {
        let invalid = |reason: &str| FeedError::InvalidVersion {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(invalid("version is empty"));
        }

        let (rest, metadata) = match trimmed.split_once('+') {
            Some((rest, meta)) => {
                if meta.is_empty() {
                    return Err(invalid("empty build metadata"));
                }
                (rest, Some(meta.to_string()))
            }
            None => (trimmed, None),
        };

        let (numbers, pre) = match rest.split_once('-') {
            Some((numbers, label)) => {
                let pre = Prerelease::new(&label.to_ascii_lowercase())
                    .map_err(|e| invalid(&format!("bad pre-release label: {}", e)))?;
                if pre.is_empty() {
                    return Err(invalid("empty pre-release label"));
                }
                (numbers, pre)
            }
            None => (rest, Prerelease::EMPTY),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(invalid("expected between one and four numeric parts"));
        }

        let mut values = [0u64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("numeric parts must be non-negative integers"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("numeric part out of range"))?;
        }

        Ok(Self {
            major: values[0],
            minor: values[1],
            patch: values[2],
            revision: values[3],
            pre,
            metadata,
            original: trimmed.to_string(),
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether this version carries a pre-release label
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Build metadata, if any
    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// The text this version was parsed from
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Normalized form: three numeric parts (four when the revision is
    /// non-zero) plus the pre-release label, without build metadata.
    ///
    /// This is the form used for folder and file names in a local repository.
    pub fn to_normalized_string(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            out.push_str(&format!(".{}", self.revision));
        }
        if !self.pre.is_empty() {
            out.push('-');
            out.push_str(self.pre.as_str());
        }
        out
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.revision.hash(state);
        self.pre.as_str().hash(state);
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.revision)
            .cmp(&(other.major, other.minor, other.patch, other.revision))
            .then_with(|| self.pre.cmp(&other.pre))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for PackageVersion {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}
