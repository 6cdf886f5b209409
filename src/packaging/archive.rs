//! Package archive (`.nupkg`) reading
//!
//! A package archive is a zip file with exactly one manifest at its root.

use super::identity::PackageIdentity;
use super::manifest::PackageManifest;
use crate::error::{FeedError, FeedResult};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Manifest file extension
pub const MANIFEST_EXTENSION: &str = ".nuspec";

/// Read-only view of a package archive
#[derive(Debug)]
pub struct PackageArchiveReader {
    path: PathBuf,
    files: Vec<String>,
    manifest: PackageManifest,
}

impl PackageArchiveReader {
    /// Open an archive and parse its manifest
    pub fn open(path: impl Into<PathBuf>) -> FeedResult<Self> {
        let path = path.into();
        let mut zip = open_zip(&path)?;

        let files: Vec<String> = zip.file_names().map(str::to_string).collect();

        let manifests: Vec<&String> = files
            .iter()
            .filter(|name| !name.contains('/') && is_manifest_name(name))
            .collect();

        let manifest_name = match manifests.as_slice() {
            [single] => (*single).clone(),
            [] => {
                return Err(packaging_error(&path, "archive has no manifest at its root"));
            }
            _ => {
                return Err(packaging_error(&path, "archive has more than one manifest at its root"));
            }
        };

        let mut content = String::new();
        zip.by_name(&manifest_name)
            .map_err(|e| packaging_error(&path, &e.to_string()))?
            .read_to_string(&mut content)
            .map_err(|e| FeedError::io(format!("reading {} from {}", manifest_name, path.display()), e))?;

        let manifest =
            PackageManifest::parse(&content).map_err(|reason| packaging_error(&path, &reason))?;

        Ok(Self {
            path,
            files,
            manifest,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry names in archive order
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    pub fn identity(&self) -> PackageIdentity {
        self.manifest.identity()
    }

    /// Read a single entry. Returns `Ok(None)` when the entry isn't present.
    pub fn read_entry(&self, name: &str) -> FeedResult<Option<Vec<u8>>> {
        let mut zip = open_zip(&self.path)?;
        let result = match zip.by_name(name) {
            Ok(mut entry) => {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).map_err(|e| {
                    FeedError::io(format!("reading {} from {}", name, self.path.display()), e)
                })?;
                Ok(Some(buf))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(packaging_error(&self.path, &e.to_string())),
        };
        result
    }
}

/// Whether a file name looks like a package manifest
pub fn is_manifest_name(name: &str) -> bool {
    name.len() > MANIFEST_EXTENSION.len()
        && name
            .to_ascii_lowercase()
            .ends_with(MANIFEST_EXTENSION)
}

fn open_zip(path: &Path) -> FeedResult<ZipArchive<File>> {
    let file = File::open(path)
        .map_err(|e| FeedError::io(format!("opening archive {}", path.display()), e))?;
    ZipArchive::new(file).map_err(|e| packaging_error(path, &format!("not a valid archive: {}", e)))
}

fn packaging_error(path: &Path, reason: &str) -> FeedError {
    FeedError::PackagingFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
