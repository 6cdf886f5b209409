//! Resource providers and the ordered catalog that holds them

use super::providers::{
    HttpSourceProvider, LocalRepositoryProvider, ODataFeedProvider, PackageBaseAddressProvider,
    ServiceIndexProvider,
};
use super::source::PackageSource;
use super::source_repository::SourceRepository;
use crate::cache::LocalMetadataCache;
use crate::error::{FeedError, FeedResult};
use crate::protocol::DocumentFetcher;
use async_trait::async_trait;
use semver::Version;
use std::any::{Any, TypeId};
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// A type-erased resource instance
pub type AnyResource = Arc<dyn Any + Send + Sync>;

/// Builds one kind of resource for a source, when the source supports it
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// `TypeId` of the resource this provider builds
    fn resource_type(&self) -> TypeId;

    /// Build the resource, or `Ok(None)` when this source does not support it
    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> FeedResult<Option<AnyResource>>;
}

/// Providers in registration order
#[derive(Clone, Default)]
pub struct ResourceCatalog {
    providers: Vec<Arc<dyn ResourceProvider>>,
}

impl ResourceCatalog {
    pub fn new(providers: Vec<Arc<dyn ResourceProvider>>) -> Self {
        Self { providers }
    }

    /// The built-in providers: HTTP access, service index, flat container,
    /// OData feed and local repository
    pub fn standard(fetcher: Arc<dyn DocumentFetcher>, cache: Arc<LocalMetadataCache>) -> Self {
        Self::new(vec![
            Arc::new(HttpSourceProvider::new(fetcher)),
            Arc::new(ServiceIndexProvider),
            Arc::new(PackageBaseAddressProvider),
            Arc::new(ODataFeedProvider),
            Arc::new(LocalRepositoryProvider::new(cache)),
        ])
    }

    /// Append a provider; it is consulted after every existing one
    pub fn register(&mut self, provider: Arc<dyn ResourceProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Providers for a resource type, in registration order
    pub fn providers_for(&self, resource_type: TypeId) -> impl Iterator<Item = &Arc<dyn ResourceProvider>> {
        self.providers
            .iter()
            .filter(move |p| p.resource_type() == resource_type)
    }
}

impl std::fmt::Debug for ResourceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Creates repositories that share one catalog
pub struct RepositoryFactory {
    catalog: RwLock<Arc<ResourceCatalog>>,
    client_version: Version,
}

impl RepositoryFactory {
    pub fn new(catalog: ResourceCatalog) -> FeedResult<Self> {
        Self::check(&catalog)?;
        Ok(Self {
            catalog: RwLock::new(Arc::new(catalog)),
            client_version: super::DEFAULT_CLIENT_VERSION,
        })
    }

    /// Client version used for capability selection in created repositories
    pub fn with_client_version(mut self, version: Version) -> Self {
        self.client_version = version;
        self
    }

    pub fn catalog(&self) -> Arc<ResourceCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap the catalog used for repositories created from now on
    pub fn replace_catalog(&self, catalog: ResourceCatalog) -> FeedResult<()> {
        Self::check(&catalog)?;
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
        Ok(())
    }

    pub fn create(&self, source: PackageSource) -> SourceRepository {
        SourceRepository::new(source, self.catalog()).with_client_version(self.client_version.clone())
    }

    fn check(catalog: &ResourceCatalog) -> FeedResult<()> {
        if catalog.is_empty() {
            return Err(FeedError::argument("catalog", "must contain at least one provider"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::test_support::StaticFetcher;

    fn standard() -> ResourceCatalog {
        ResourceCatalog::standard(Arc::new(StaticFetcher::new()), Arc::new(LocalMetadataCache::new()))
    }

    #[test]
    fn standard_catalog_order() {
        assert_eq!(
            standard().names(),
            vec![
                "HttpSourceProvider",
                "ServiceIndexProvider",
                "PackageBaseAddressProvider",
                "ODataFeedProvider",
                "LocalRepositoryProvider"
            ]
        );
    }

    #[test]
    fn factory_rejects_empty_catalog() {
        assert!(matches!(
            RepositoryFactory::new(ResourceCatalog::default()),
            Err(FeedError::InvalidArgument { name: "catalog", .. })
        ));

        let factory = RepositoryFactory::new(standard()).unwrap();
        assert!(factory.replace_catalog(ResourceCatalog::default()).is_err());
        assert_eq!(factory.catalog().len(), 5);
    }

    #[test]
    fn replaced_catalog_applies_to_new_repositories() {
        let factory = RepositoryFactory::new(standard()).unwrap();
        let before = factory.create(PackageSource::from_location("/tmp/a"));

        let mut smaller = ResourceCatalog::default();
        smaller.register(Arc::new(LocalRepositoryProvider::new(Arc::new(LocalMetadataCache::new()))));
        factory.replace_catalog(smaller).unwrap();

        let after = factory.create(PackageSource::from_location("/tmp/a"));
        assert_eq!(before.catalog().len(), 5);
        assert_eq!(after.catalog().len(), 1);
    }
}
