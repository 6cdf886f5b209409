//! Per-source resource access
//!
//! A `SourceRepository` builds each resource type at most once and keeps it
//! for its own lifetime. "No provider could build it" is remembered too.
//! Failures and cancellations are not, so a later call may try again.

use super::catalog::{AnyResource, ResourceCatalog};
use super::source::PackageSource;
use crate::error::{FeedError, FeedResult};
use semver::Version;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type ResourceSlot = Arc<OnceCell<Option<AnyResource>>>;

/// A package source plus the resources built for it
pub struct SourceRepository {
    source: PackageSource,
    catalog: Arc<ResourceCatalog>,
    client_version: Version,
    resources: Mutex<HashMap<TypeId, ResourceSlot>>,
}

impl SourceRepository {
    pub fn new(source: PackageSource, catalog: Arc<ResourceCatalog>) -> Self {
        Self {
            source,
            catalog,
            client_version: super::DEFAULT_CLIENT_VERSION,
            resources: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_client_version(mut self, version: Version) -> Self {
        self.client_version = version;
        self
    }

    pub fn source(&self) -> &PackageSource {
        &self.source
    }

    pub fn catalog(&self) -> &Arc<ResourceCatalog> {
        &self.catalog
    }

    /// Client version used when selecting capability endpoints
    pub fn client_version(&self) -> &Version {
        &self.client_version
    }

    /// Get the resource of type `T`, building it on first use.
    ///
    /// Providers registered for `T` are asked in order; the first one that
    /// builds the resource wins. Returns `Ok(None)` when none can.
    pub async fn get<T>(&self, token: &CancellationToken) -> FeedResult<Option<Arc<T>>>
    where
        T: Any + Send + Sync,
    {
        let type_id = TypeId::of::<T>();
        let slot = {
            let mut resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(resources.entry(type_id).or_default())
        };

        let resource = slot
            .get_or_try_init(|| self.create(type_id, std::any::type_name::<T>(), token))
            .await?;

        match resource {
            None => Ok(None),
            Some(resource) => Arc::clone(resource).downcast::<T>().map(Some).map_err(|_| {
                FeedError::Internal(format!(
                    "provider returned the wrong type for {}",
                    std::any::type_name::<T>()
                ))
            }),
        }
    }

    async fn create(
        &self,
        type_id: TypeId,
        type_name: &str,
        token: &CancellationToken,
    ) -> FeedResult<Option<AnyResource>> {
        for provider in self.catalog.providers_for(type_id) {
            if token.is_cancelled() {
                return Err(FeedError::Cancelled);
            }
            if let Some(resource) = provider.try_create(self, token).await? {
                debug!("{} built {} for {}", provider.name(), type_name, self.source);
                return Ok(Some(resource));
            }
        }
        debug!("No provider built {} for {}", type_name, self.source);
        Ok(None)
    }
}

impl std::fmt::Debug for SourceRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRepository")
            .field("source", &self.source)
            .field("catalog", &self.catalog)
            .finish()
    }
}
