//! Path layout of a local package repository
//!
//! ```text
//! {root}/
//! └── {id-lower}/
//!     └── {version-lower}/
//!         ├── {id-lower}.{version-lower}.nupkg
//!         ├── {id-lower}.{version-lower}.nupkg.sha512
//!         ├── {id-lower}.nuspec
//!         └── .nupkg.metadata
//! ```

use crate::packaging::PackageVersion;
use std::path::{Path, PathBuf};

/// Name of the marker written after a package is fully extracted
pub const METADATA_FILE_NAME: &str = ".nupkg.metadata";

/// Computes file and folder paths for packages under a repository root
#[derive(Debug, Clone)]
pub struct VersionFolderPathResolver {
    root: PathBuf,
}

impl VersionFolderPathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every installed version of a package
    pub fn version_list_path(&self, id: &str) -> PathBuf {
        self.root.join(id.to_ascii_lowercase())
    }

    /// Folder of one installed version
    pub fn install_path(&self, id: &str, version: &PackageVersion) -> PathBuf {
        self.version_list_path(id).join(folder_version(version))
    }

    pub fn package_file_name(&self, id: &str, version: &PackageVersion) -> String {
        format!("{}.{}.nupkg", id.to_ascii_lowercase(), folder_version(version))
    }

    pub fn package_file_path(&self, id: &str, version: &PackageVersion) -> PathBuf {
        self.install_path(id, version)
            .join(self.package_file_name(id, version))
    }

    pub fn hash_file_name(&self, id: &str, version: &PackageVersion) -> String {
        format!("{}.sha512", self.package_file_name(id, version))
    }

    pub fn hash_path(&self, id: &str, version: &PackageVersion) -> PathBuf {
        self.install_path(id, version)
            .join(self.hash_file_name(id, version))
    }

    pub fn manifest_file_name(&self, id: &str) -> String {
        format!("{}.nuspec", id.to_ascii_lowercase())
    }

    pub fn manifest_path(&self, id: &str, version: &PackageVersion) -> PathBuf {
        self.install_path(id, version)
            .join(self.manifest_file_name(id))
    }

    pub fn metadata_path(&self, id: &str, version: &PackageVersion) -> PathBuf {
        self.install_path(id, version).join(METADATA_FILE_NAME)
    }
}

fn folder_version(version: &PackageVersion) -> String {
    version.to_normalized_string().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_lowercase_and_normalized() {
        let resolver = VersionFolderPathResolver::new("/repo");
        let version = PackageVersion::parse("1.0-Beta+sha").unwrap();

        assert_eq!(
            resolver.package_file_path("Contoso.Lib", &version),
            PathBuf::from("/repo/contoso.lib/1.0.0-beta/contoso.lib.1.0.0-beta.nupkg")
        );
        assert_eq!(
            resolver.hash_path("Contoso.Lib", &version),
            PathBuf::from("/repo/contoso.lib/1.0.0-beta/contoso.lib.1.0.0-beta.nupkg.sha512")
        );
        assert_eq!(
            resolver.manifest_path("Contoso.Lib", &version),
            PathBuf::from("/repo/contoso.lib/1.0.0-beta/contoso.lib.nuspec")
        );
        assert_eq!(
            resolver.metadata_path("Contoso.Lib", &version),
            PathBuf::from("/repo/contoso.lib/1.0.0-beta/.nupkg.metadata")
        );
    }
}
