//! Remote source protocols
//!
//! Two wire protocols are supported: JSON service indexes, which advertise
//! capability endpoints such as the flat-container content endpoint, and
//! paged OData (Atom) feeds.

pub mod base_address;
pub mod http;
pub mod odata;
pub mod retry;
pub mod service_index;

pub use base_address::PackageBaseAddressResource;
pub use http::{DocumentFetcher, UreqFetcher, UserAgent};
pub use odata::{FeedPackage, ODataFeedResource};
pub use retry::{EnvironmentReader, ProcessEnvironment, RetryPolicy};
pub use service_index::{CapabilityEntry, ServiceIndex};

use crate::error::FeedResult;
use crate::packaging::PackageIdentity;
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

/// Anything that can stream a package archive by identity
#[async_trait]
pub trait PackageContentSource: Send + Sync {
    /// Write the archive to `destination`. Returns `false` when the source
    /// does not have the package.
    async fn copy_nupkg_to_stream(
        &self,
        identity: &PackageIdentity,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
        token: &CancellationToken,
    ) -> FeedResult<bool>;
}
