//! Built-in resources and the providers that build them

use super::catalog::{AnyResource, ResourceProvider};
use super::source::FeedKind;
use super::source_repository::SourceRepository;
use crate::cache::LocalMetadataCache;
use crate::error::{FeedError, FeedResult};
use crate::local::LocalRepositoryIndex;
use crate::protocol::service_index::PACKAGE_BASE_ADDRESS;
use crate::protocol::{
    CapabilityEntry, DocumentFetcher, ODataFeedResource, PackageBaseAddressResource, ServiceIndex,
};
use async_trait::async_trait;
use semver::Version;
use std::any::TypeId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// HTTP access to a remote source
pub struct HttpSourceResource {
    source: Url,
    fetcher: Arc<dyn DocumentFetcher>,
}

impl HttpSourceResource {
    pub fn source(&self) -> &Url {
        &self.source
    }

    pub fn fetcher(&self) -> Arc<dyn DocumentFetcher> {
        Arc::clone(&self.fetcher)
    }

    pub async fn fetch(&self, uri: &str, token: &CancellationToken) -> FeedResult<Vec<u8>> {
        self.fetcher.fetch(uri, token).await
    }
}

/// The parsed service index of a source
#[derive(Debug)]
pub struct ServiceIndexResource {
    source: Url,
    index: ServiceIndex,
}

impl ServiceIndexResource {
    pub fn source(&self) -> &Url {
        &self.source
    }

    pub fn index(&self) -> &ServiceIndex {
        &self.index
    }

    pub fn entries(&self) -> &[CapabilityEntry] {
        self.index.entries()
    }

    pub fn select_uris(&self, client_version: &Version, types: &[&str]) -> Vec<Url> {
        self.index.select_uris(client_version, types)
    }
}

/// Wraps the injected fetcher for HTTP sources
pub struct HttpSourceProvider {
    fetcher: Arc<dyn DocumentFetcher>,
}

impl HttpSourceProvider {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ResourceProvider for HttpSourceProvider {
    fn name(&self) -> &'static str {
        "HttpSourceProvider"
    }

    fn resource_type(&self) -> TypeId {
        TypeId::of::<HttpSourceResource>()
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        _token: &CancellationToken,
    ) -> FeedResult<Option<AnyResource>> {
        let Some(source) = repository.source().http_url() else {
            return Ok(None);
        };
        Ok(Some(Arc::new(HttpSourceResource {
            source,
            fetcher: Arc::clone(&self.fetcher),
        })))
    }
}

/// Loads the service index of `*.json` HTTP sources
pub struct ServiceIndexProvider;

#[async_trait]
impl ResourceProvider for ServiceIndexProvider {
    fn name(&self) -> &'static str {
        "ServiceIndexProvider"
    }

    fn resource_type(&self) -> TypeId {
        TypeId::of::<ServiceIndexResource>()
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> FeedResult<Option<AnyResource>> {
        if repository.source().feed_kind() != FeedKind::ServiceIndex {
            return Ok(None);
        }
        let Some(http) = repository.get::<HttpSourceResource>(token).await? else {
            return Ok(None);
        };

        let uri = http.source().to_string();
        let body = match http.fetch(&uri, token).await {
            Ok(body) => body,
            Err(FeedError::Cancelled) => return Err(FeedError::Cancelled),
            Err(e) => return Err(FeedError::protocol(&uri, e)),
        };

        let text = String::from_utf8_lossy(&body);
        let index = ServiceIndex::parse(&text).map_err(|e| FeedError::protocol(&uri, e))?;
        info!("Loaded service index for {} ({} entries)", uri, index.entries().len());

        Ok(Some(Arc::new(ServiceIndexResource {
            source: http.source().clone(),
            index,
        })))
    }
}

/// Flat-container endpoint advertised by a service index
pub struct PackageBaseAddressProvider;

#[async_trait]
impl ResourceProvider for PackageBaseAddressProvider {
    fn name(&self) -> &'static str {
        "PackageBaseAddressProvider"
    }

    fn resource_type(&self) -> TypeId {
        TypeId::of::<PackageBaseAddressResource>()
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> FeedResult<Option<AnyResource>> {
        let Some(index) = repository.get::<ServiceIndexResource>(token).await? else {
            return Ok(None);
        };
        let Some(http) = repository.get::<HttpSourceResource>(token).await? else {
            return Ok(None);
        };

        let uris = index.select_uris(repository.client_version(), &[PACKAGE_BASE_ADDRESS]);
        let Some(base) = uris.first() else {
            debug!("{} does not advertise {}", repository.source(), PACKAGE_BASE_ADDRESS);
            return Ok(None);
        };

        Ok(Some(Arc::new(PackageBaseAddressResource::new(base, http.fetcher()))))
    }
}

/// OData feed access for HTTP sources that are not service indexes
pub struct ODataFeedProvider;

#[async_trait]
impl ResourceProvider for ODataFeedProvider {
    fn name(&self) -> &'static str {
        "ODataFeedProvider"
    }

    fn resource_type(&self) -> TypeId {
        TypeId::of::<ODataFeedResource>()
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> FeedResult<Option<AnyResource>> {
        if repository.source().feed_kind() != FeedKind::ODataFeed {
            return Ok(None);
        }
        let Some(http) = repository.get::<HttpSourceResource>(token).await? else {
            return Ok(None);
        };
        Ok(Some(Arc::new(ODataFeedResource::new(http.source(), http.fetcher()))))
    }
}

/// Installed-package index for local folder sources
pub struct LocalRepositoryProvider {
    cache: Arc<LocalMetadataCache>,
}

impl LocalRepositoryProvider {
    pub fn new(cache: Arc<LocalMetadataCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ResourceProvider for LocalRepositoryProvider {
    fn name(&self) -> &'static str {
        "LocalRepositoryProvider"
    }

    fn resource_type(&self) -> TypeId {
        TypeId::of::<LocalRepositoryIndex>()
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        _token: &CancellationToken,
    ) -> FeedResult<Option<AnyResource>> {
        let Some(root) = repository.source().local_path() else {
            return Ok(None);
        };
        Ok(Some(Arc::new(LocalRepositoryIndex::new(root, Arc::clone(&self.cache)))))
    }
}
