//! Role-indexed permission catalog with per-role caching.
//!
//! Permission records are loaded lazily from a [`PermissionSource`] on first
//! use per role and cached for the process lifetime (or a configured TTL).
//! Concurrent first-accesses for the same role collapse to a single backing
//! fetch. A load failure is surfaced as `BackendUnavailable` and never
//! downgraded to an empty record set, since an empty set means total denial.
//!
//! The catalog also memoizes the per-role [`RoleSchemaFilters`] computed by
//! the projection engine; both caches are invalidated together.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use crate::catalog::{InputCatalog, ModelCatalog};
use crate::error::{DomainError, DomainResult};
use crate::policy::{validate_records, PermissionRecord, PermType};
use crate::projection::{role_schema_filters, RoleSchemaFilters, RootFieldAnnotation};

/// Backing store for permission records.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Loads every permission record declared for a role. A transient store
    /// failure must be returned as an error, never as an empty set.
    async fn load_permissions(&self, role: &str) -> DomainResult<Vec<PermissionRecord>>;
}

/// Configuration for the permission catalog caches.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Maximum number of cached roles.
    pub max_roles: u64,
    /// Optional TTL; `None` caches for the process lifetime until an
    /// explicit invalidation.
    pub ttl: Option<Duration>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_roles: 1024,
            ttl: None,
        }
    }
}

impl CatalogConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

fn build_cache<V: Clone + Send + Sync + 'static>(config: &CatalogConfig) -> Cache<String, V> {
    let mut builder = Cache::builder().max_capacity(config.max_roles);
    if let Some(ttl) = config.ttl {
        builder = builder.time_to_live(ttl);
    }
    builder.build()
}

/// Role-indexed, cached permission catalog.
pub struct PermissionCatalog<S> {
    source: Arc<S>,
    models: Arc<ModelCatalog>,
    inputs: InputCatalog,
    annotations: Vec<RootFieldAnnotation>,
    records: Cache<String, Arc<Vec<PermissionRecord>>>,
    filters: Cache<String, Arc<RoleSchemaFilters>>,
}

impl<S: PermissionSource + 'static> PermissionCatalog<S> {
    pub fn new(source: Arc<S>, models: Arc<ModelCatalog>, config: CatalogConfig) -> Self {
        Self {
            source,
            inputs: InputCatalog::derive(models.as_ref()),
            models,
            annotations: Vec::new(),
            records: build_cache(&config),
            filters: build_cache(&config),
        }
    }

    /// Attaches allow/prevent role annotations for non-model root fields,
    /// consulted by schema projection.
    pub fn with_annotations(mut self, annotations: Vec<RootFieldAnnotation>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn model_catalog(&self) -> &Arc<ModelCatalog> {
        &self.models
    }

    /// Returns the validated permission records for a role, fetching and
    /// caching them on first access. Concurrent misses for the same role are
    /// collapsed to one backing fetch; errors are not cached, so a later call
    /// retries the source.
    pub async fn permissions(&self, role: &str) -> DomainResult<Arc<Vec<PermissionRecord>>> {
        let source = Arc::clone(&self.source);
        let models = Arc::clone(&self.models);
        let role_key = role.to_string();
        self.records
            .try_get_with(role_key.clone(), async move {
                debug!(role = %role_key, "loading permission records");
                let loaded = source.load_permissions(&role_key).await?;
                Ok::<_, DomainError>(Arc::new(validate_records(loaded, models.as_ref())))
            })
            .await
            .map_err(|e: Arc<DomainError>| DomainError::BackendUnavailable {
                message: e.to_string(),
            })
    }

    /// Convenience lookup of the record for (role, model, type).
    pub async fn permission(
        &self,
        role: &str,
        model: &str,
        perm_type: PermType,
    ) -> DomainResult<Option<PermissionRecord>> {
        let records = self.permissions(role).await?;
        Ok(records
            .iter()
            .find(|r| r.model == model && r.perm_type == perm_type)
            .cloned())
    }

    /// Returns the role's schema deny-lists, computing and caching them on
    /// first access. A pure function of (model catalog, records), so
    /// concurrent population is harmless; single-flight avoids the duplicate
    /// work regardless.
    pub async fn schema_filters(&self, role: &str) -> DomainResult<Arc<RoleSchemaFilters>> {
        let records = self.permissions(role).await?;
        let role_key = role.to_string();
        self.filters
            .try_get_with(role_key.clone(), async move {
                Ok::<_, DomainError>(Arc::new(role_schema_filters(
                    self.models.as_ref(),
                    &self.inputs,
                    &records,
                    &role_key,
                    &self.annotations,
                )))
            })
            .await
            .map_err(|e: Arc<DomainError>| DomainError::BackendUnavailable {
                message: e.to_string(),
            })
    }

    /// Drops the cached records and schema filters for one role.
    pub async fn invalidate(&self, role: &str) {
        self.records.invalidate(role).await;
        self.filters.invalidate(role).await;
    }

    /// Drops every cached role.
    pub fn invalidate_all(&self) {
        self.records.invalidate_all();
        self.filters.invalidate_all();
    }
}
