//! Installed-package index over a local repository
//!
//! The index scans an id's version folders once and keeps the resulting
//! list until that id is cleared. Lists are immutable once published, so a
//! reader sees either the old list or the new one, never a mix.

use super::layout::VersionFolderPathResolver;
use crate::cache::{LocalMetadataCache, MemoCell};
use crate::error::FeedResult;
use crate::packaging::{PackageArchiveReader, PackageIdentity, PackageManifest, PackageVersion};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, warn};

/// An installed package version
#[derive(Debug)]
pub struct LocalPackageInfo {
    identity: PackageIdentity,
    path: PathBuf,
    install_dir: PathBuf,
    last_write_time_utc: DateTime<Utc>,
    manifest: Arc<MemoCell<PackageManifest>>,
    files: Arc<MemoCell<Vec<String>>>,
    sha512: Arc<MemoCell<String>>,
}

impl LocalPackageInfo {
    /// Id as the caller spelled it, version as the folder spells it
    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    /// Path of the package archive
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Folder the package was extracted into
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn last_write_time_utc(&self) -> DateTime<Utc> {
        self.last_write_time_utc
    }

    /// Shared manifest cell; equal identities share one cell
    pub fn manifest_cell(&self) -> &Arc<MemoCell<PackageManifest>> {
        &self.manifest
    }

    pub fn manifest(&self) -> FeedResult<Arc<PackageManifest>> {
        self.manifest.value()
    }

    pub fn files(&self) -> FeedResult<Arc<Vec<String>>> {
        self.files.value()
    }

    pub fn sha512(&self) -> FeedResult<Arc<String>> {
        self.sha512.value()
    }

    /// Open the package archive
    pub fn open_archive(&self) -> FeedResult<PackageArchiveReader> {
        PackageArchiveReader::open(&self.path)
    }
}

type PackageList = Arc<Vec<Arc<LocalPackageInfo>>>;

/// Per-id cached view of what is installed under a repository root
#[derive(Debug)]
pub struct LocalRepositoryIndex {
    resolver: VersionFolderPathResolver,
    cache: Arc<LocalMetadataCache>,
    entries: Mutex<HashMap<String, Arc<OnceLock<PackageList>>>>,
}

impl LocalRepositoryIndex {
    pub fn new(root: impl Into<PathBuf>, cache: Arc<LocalMetadataCache>) -> Self {
        Self {
            resolver: VersionFolderPathResolver::new(root),
            cache,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn resolver(&self) -> &VersionFolderPathResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<LocalMetadataCache> {
        &self.cache
    }

    /// All installed versions of a package, lowest first.
    ///
    /// Ids match without regard to case. An id with nothing installed
    /// yields an empty list.
    pub fn find_packages_by_id(&self, id: &str) -> PackageList {
        let key = id.to_ascii_lowercase();
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(key).or_default())
        };
        Arc::clone(slot.get_or_init(|| Arc::new(self.scan(id))))
    }

    /// The installed package with this version, if any
    pub fn find_package(&self, id: &str, version: &PackageVersion) -> Option<Arc<LocalPackageInfo>> {
        self.find_packages_by_id(id)
            .iter()
            .find(|info| info.identity.version() == version)
            .cloned()
    }

    /// Forget the cached lists for these ids; the next lookup rescans
    pub fn clear_cache_for_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            entries.remove(&id.as_ref().to_ascii_lowercase());
        }
    }

    fn scan(&self, id: &str) -> Vec<Arc<LocalPackageInfo>> {
        let id_dir = self.resolver.version_list_path(id);
        let entries = match std::fs::read_dir(&id_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No versions of {} under {}: {}", id, self.root().display(), e);
                return Vec::new();
            }
        };

        let mut packages = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let folder = entry.path();
            if !folder.is_dir() {
                continue;
            }
            let Some(name) = folder.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let version = match PackageVersion::parse(name) {
                Ok(version) => version,
                Err(_) => {
                    warn!("Skipping invalid version folder {}", folder.display());
                    continue;
                }
            };

            if !self.is_installed(id, &version) {
                continue;
            }

            packages.push(Arc::new(self.package_info(id, version)));
        }

        packages.sort_by(|a, b| a.identity.version().cmp(b.identity.version()));
        debug!("Found {} installed versions of {}", packages.len(), id);
        packages
    }

    /// The hash file or the metadata marker is written last during install
    fn is_installed(&self, id: &str, version: &PackageVersion) -> bool {
        self.cache.sha512_exists(&self.resolver.hash_path(id, version))
            || self.resolver.metadata_path(id, version).is_file()
    }

    fn package_info(&self, id: &str, version: PackageVersion) -> LocalPackageInfo {
        let install_dir = self.resolver.install_path(id, &version);
        let path = self.resolver.package_file_path(id, &version);
        let manifest_path = self.resolver.manifest_path(id, &version);

        let modified = std::fs::metadata(&path)
            .or_else(|_| std::fs::metadata(&install_dir))
            .and_then(|m| m.modified());
        let last_write_time_utc = match modified {
            Ok(time) => DateTime::<Utc>::from(time),
            Err(_) => DateTime::<Utc>::UNIX_EPOCH,
        };

        LocalPackageInfo {
            manifest: self.cache.get_or_add_manifest(&manifest_path, &install_dir),
            files: self.cache.get_or_add_file_list(&install_dir),
            sha512: self.cache.get_or_add_sha512(&self.resolver.hash_path(id, &version)),
            identity: PackageIdentity::new(id, version),
            path,
            install_dir,
            last_write_time_utc,
        }
    }
}
