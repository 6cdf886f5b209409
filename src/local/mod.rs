//! Local package repositories
//!
//! A local repository is a folder tree of extracted packages, one folder per
//! id and version. See [`layout`] for the exact shape.

pub mod index;
pub mod layout;

pub use index::{LocalPackageInfo, LocalRepositoryIndex};
pub use layout::VersionFolderPathResolver;
