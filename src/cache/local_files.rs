//! Per-path caches for expensive reads in a local package repository
//!
//! Every entry is keyed by path and lives as long as the cache. Nothing
//! here is ever evicted.

use super::memo::{ExistenceProbe, MemoCell};
use crate::error::{FeedError, FeedResult};
use crate::packaging::archive::is_manifest_name;
use crate::packaging::PackageManifest;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Result of one manifest lookup strategy
enum Lookup {
    Found(PathBuf),
    NotFound,
    Failed(FeedError),
}

type Strategy = fn(&Path, &Path) -> Lookup;

/// The manifest file at its expected path
fn expected_path(manifest_path: &Path, _expanded_dir: &Path) -> Lookup {
    if manifest_path.is_file() {
        Lookup::Found(manifest_path.to_path_buf())
    } else {
        Lookup::NotFound
    }
}

/// Exactly one manifest anywhere at the top of the package folder
fn scan_folder(_manifest_path: &Path, expanded_dir: &Path) -> Lookup {
    let entries = match std::fs::read_dir(expanded_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Lookup::Failed(FeedError::DirectoryNotFound(expanded_dir.to_path_buf()));
        }
        Err(e) => {
            return Lookup::Failed(FeedError::io(
                format!("listing {}", expanded_dir.display()),
                e,
            ));
        }
    };

    let candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_manifest_name)
        })
        .collect();

    match candidates.len() {
        1 => candidates
            .into_iter()
            .next()
            .map_or(Lookup::NotFound, Lookup::Found),
        0 => Lookup::Failed(FeedError::PackagingFormat {
            path: expanded_dir.to_path_buf(),
            reason: "no manifest file found".to_string(),
        }),
        n => Lookup::Failed(FeedError::PackagingFormat {
            path: expanded_dir.to_path_buf(),
            reason: format!("found {} manifest files, expected one", n),
        }),
    }
}

const MANIFEST_STRATEGIES: &[Strategy] = &[expected_path, scan_folder];

fn find_manifest(manifest_path: &Path, expanded_dir: &Path) -> FeedResult<PathBuf> {
    for strategy in MANIFEST_STRATEGIES {
        match strategy(manifest_path, expanded_dir) {
            Lookup::Found(path) => return Ok(path),
            Lookup::NotFound => continue,
            Lookup::Failed(e) => return Err(e),
        }
    }
    Err(FeedError::PackagingFormat {
        path: expanded_dir.to_path_buf(),
        reason: "no manifest file found".to_string(),
    })
}

/// List every file under `dir`, relative, with `/` separators
fn list_files(dir: &Path) -> FeedResult<Vec<String>> {
    if !dir.is_dir() {
        return Err(FeedError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .map_err(|e| FeedError::io(format!("listing {}", current.display()), e))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| FeedError::io(format!("listing {}", current.display()), e))?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(dir) {
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(parts.join("/"));
            }
        }
    }
    files.sort();
    Ok(files)
}

fn read_sha512(path: &Path) -> FeedResult<String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FeedError::io(format!("reading hash file {}", path.display()), e))?;
    Ok(content.trim().to_string())
}

fn get_or_insert<K, V>(map: &Mutex<HashMap<K, Arc<V>>>, key: K, make: impl FnOnce() -> V) -> Arc<V>
where
    K: Eq + Hash,
{
    let mut map = map.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(map.entry(key).or_insert_with(|| Arc::new(make())))
}

/// Shared cache of manifest reads, file listings, hash files and access-time
/// touches for a local repository
#[derive(Debug, Default)]
pub struct LocalMetadataCache {
    manifests: Mutex<HashMap<PathBuf, Arc<MemoCell<PackageManifest>>>>,
    file_lists: Mutex<HashMap<PathBuf, Arc<MemoCell<Vec<String>>>>>,
    sha512_probes: Mutex<HashMap<PathBuf, Arc<ExistenceProbe>>>,
    sha512_values: Mutex<HashMap<PathBuf, Arc<MemoCell<String>>>>,
    touched: Mutex<HashSet<PathBuf>>,
}

impl LocalMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manifest for a package folder.
    ///
    /// Reads `manifest_path` when it exists, otherwise looks for the single
    /// manifest file in `expanded_dir`. The parse runs on first access of
    /// the returned cell and its outcome is kept.
    pub fn get_or_add_manifest(
        &self,
        manifest_path: &Path,
        expanded_dir: &Path,
    ) -> Arc<MemoCell<PackageManifest>> {
        get_or_insert(&self.manifests, manifest_path.to_path_buf(), || {
            let manifest_path = manifest_path.to_path_buf();
            let expanded_dir = expanded_dir.to_path_buf();
            MemoCell::new(move || {
                let found = find_manifest(&manifest_path, &expanded_dir)?;
                debug!("Reading manifest {}", found.display());
                PackageManifest::from_file(&found)
            })
        })
    }

    /// All files in a package folder
    pub fn get_or_add_file_list(&self, dir: &Path) -> Arc<MemoCell<Vec<String>>> {
        get_or_insert(&self.file_lists, dir.to_path_buf(), || {
            let dir = dir.to_path_buf();
            MemoCell::new(move || list_files(&dir))
        })
    }

    /// Whether a hash file exists. Only a positive answer is remembered.
    pub fn sha512_exists(&self, path: &Path) -> bool {
        let probe = get_or_insert(&self.sha512_probes, path.to_path_buf(), ExistenceProbe::new);
        probe.exists(|| path.is_file())
    }

    /// Base64 package hash read from a `.sha512` file
    pub fn get_or_add_sha512(&self, path: &Path) -> Arc<MemoCell<String>> {
        get_or_insert(&self.sha512_values, path.to_path_buf(), || {
            let path = path.to_path_buf();
            MemoCell::new(move || read_sha512(&path))
        })
    }

    /// Mark a file as recently used.
    ///
    /// Each path is touched at most once per cache. Failures are logged and
    /// otherwise ignored.
    pub fn update_last_access_time(&self, path: &Path) {
        {
            let mut touched = self.touched.lock().unwrap_or_else(PoisonError::into_inner);
            if !touched.insert(path.to_path_buf()) {
                return;
            }
        }

        let result = std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(SystemTime::now()));
        match result {
            Ok(()) => debug!("Updated last access time of {}", path.display()),
            Err(e) => warn!("Failed to update last access time of {}: {}", path.display(), e),
        }
    }
}
