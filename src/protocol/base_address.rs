//! Flat-container content endpoint (`PackageBaseAddress/3.0.0`)
//!
//! ```text
//! {base}/{id-lower}/index.json                          version list
//! {base}/{id-lower}/{version-lower}/{id-lower}.{version-lower}.nupkg
//! ```

use super::http::DocumentFetcher;
use super::PackageContentSource;
use crate::error::{FeedError, FeedResult};
use crate::packaging::{PackageIdentity, PackageVersion};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct VersionList {
    #[serde(default)]
    versions: Vec<String>,
}

/// Lists versions and downloads archives from a flat container
pub struct PackageBaseAddressResource {
    base: String,
    fetcher: Arc<dyn DocumentFetcher>,
}

impl PackageBaseAddressResource {
    pub fn new(base: &Url, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base, fetcher }
    }

    pub fn base_address(&self) -> &str {
        &self.base
    }

    pub fn versions_uri(&self, id: &str) -> String {
        format!("{}{}/index.json", self.base, id.to_ascii_lowercase())
    }

    pub fn nupkg_uri(&self, identity: &PackageIdentity) -> String {
        let id = identity.normalized_id();
        let version = identity.version().to_normalized_string().to_ascii_lowercase();
        format!("{}{}/{}/{}.{}.nupkg", self.base, id, version, id, version)
    }

    /// Published versions of a package, lowest first. Unknown ids yield an
    /// empty list.
    pub async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> FeedResult<Vec<PackageVersion>> {
        let uri = self.versions_uri(id);
        let body = match self.fetcher.fetch(&uri, token).await {
            Ok(body) => body,
            Err(FeedError::Transport {
                status: Some(404), ..
            }) => {
                debug!("No versions of {} at {}", id, uri);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let list: VersionList = serde_json::from_slice(&body).map_err(|e| FeedError::InvalidFeed {
            uri: uri.clone(),
            reason: e.to_string(),
        })?;

        let mut versions: Vec<PackageVersion> = list
            .versions
            .iter()
            .filter_map(|v| match PackageVersion::parse(v) {
                Ok(version) => Some(version),
                Err(e) => {
                    warn!("Ignoring version listed at {}: {}", uri, e);
                    None
                }
            })
            .collect();
        versions.sort();
        Ok(versions)
    }
}

#[async_trait]
impl PackageContentSource for PackageBaseAddressResource {
    async fn copy_nupkg_to_stream(
        &self,
        identity: &PackageIdentity,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
        token: &CancellationToken,
    ) -> FeedResult<bool> {
        let uri = self.nupkg_uri(identity);
        let written = match self.fetcher.fetch_into(&uri, destination, token).await {
            Ok(written) => written,
            Err(FeedError::Transport {
                status: Some(404), ..
            }) => return Ok(false),
            Err(e) => return Err(e),
        };

        destination
            .flush()
            .await
            .map_err(|e| FeedError::io(format!("writing {}", identity), e))?;
        debug!("Copied {} bytes from {}", written, uri);
        Ok(true)
    }
}
