//! Source repositories and resource providers
//!
//! Callers ask a [`SourceRepository`] for a resource by type. The repository
//! asks each provider registered for that type in its [`ResourceCatalog`],
//! in order, and keeps whatever the first successful provider builds.
//!
//! ```text
//! SourceRepository::get::<PackageBaseAddressResource>()
//!   └── PackageBaseAddressProvider
//!         ├── get::<ServiceIndexResource>()
//!         │     └── ServiceIndexProvider
//!         │           └── get::<HttpSourceResource>()
//!         └── get::<HttpSourceResource>()   (already built)
//! ```

pub mod catalog;
pub mod providers;
pub mod source;
pub mod source_repository;

pub use catalog::{AnyResource, RepositoryFactory, ResourceCatalog, ResourceProvider};
pub use providers::{HttpSourceResource, ServiceIndexResource};
pub use source::{FeedKind, PackageSource};
pub use source_repository::SourceRepository;

use semver::Version;

/// Client protocol version used to pick capability endpoints
pub const DEFAULT_CLIENT_VERSION: Version = Version::new(6, 0, 0);
