//! Package model: versions, identities, manifests and archives

pub mod archive;
pub mod identity;
pub mod manifest;
pub mod version;

pub use archive::PackageArchiveReader;
pub use identity::PackageIdentity;
pub use manifest::{DependencyGroup, ManifestDependency, PackageManifest};
pub use version::PackageVersion;
