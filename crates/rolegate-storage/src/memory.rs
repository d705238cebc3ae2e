//! In-memory storage implementation for testing.
//!
//! Rows are held per model in a `DashMap<String, Vec<Row>>`; filters are
//! evaluated directly with the domain crate's row matcher, so the backend
//! honors exactly the predicate semantics enforcement produces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

use rolegate_domain::engine::RowCounter;
use rolegate_domain::error::{DomainError, DomainResult};
use rolegate_domain::filter::{FilterExpr, Selector};
use rolegate_domain::perms::PermissionSource;
use rolegate_domain::policy::PermissionRecord;

use crate::error::{StorageError, StorageResult};
use crate::traits::{DataStore, Row};

/// In-memory implementation of DataStore.
///
/// Uses DashMap for thread-safe concurrent access; each model's rows live in
/// one entry, so operations on different models never contend.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    rows: DashMap<String, Vec<Row>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seeds a model with rows, replacing any existing ones. Non-object
    /// values are skipped.
    pub fn seed(&self, model: &str, rows: Vec<Value>) {
        let rows = rows
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        self.rows.insert(model.to_string(), rows);
    }
}

fn selector_matches(selector: &Selector, row: &Row) -> bool {
    selector.to_filter().matches_row(row)
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn count(&self, model: &str, filter: &FilterExpr) -> StorageResult<u64> {
        let count = self
            .rows
            .get(model)
            .map(|rows| rows.iter().filter(|r| filter.matches_row(r)).count() as u64)
            .unwrap_or(0);
        trace!(model = %model, count, "counted rows");
        Ok(count)
    }

    async fn find_unique(&self, model: &str, selector: &Selector) -> StorageResult<Option<Row>> {
        Ok(self.rows.get(model).and_then(|rows| {
            rows.iter().find(|r| selector_matches(selector, r)).cloned()
        }))
    }

    async fn find_many(&self, model: &str, filter: &FilterExpr) -> StorageResult<Vec<Row>> {
        Ok(self
            .rows
            .get(model)
            .map(|rows| {
                rows.iter()
                    .filter(|r| filter.matches_row(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, model: &str, row: Row) -> StorageResult<Row> {
        self.rows
            .entry(model.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, model: &str, selector: &Selector, changes: Row) -> StorageResult<Row> {
        let mut rows = self
            .rows
            .get_mut(model)
            .ok_or_else(|| StorageError::ModelNotFound(model.to_string()))?;
        let row = rows
            .iter_mut()
            .find(|r| selector_matches(selector, r))
            .ok_or_else(|| StorageError::RowNotFound {
                model: model.to_string(),
            })?;
        for (key, value) in changes {
            row.insert(key, value);
        }
        Ok(row.clone())
    }

    async fn delete(&self, model: &str, selector: &Selector) -> StorageResult<Row> {
        let mut rows = self
            .rows
            .get_mut(model)
            .ok_or_else(|| StorageError::ModelNotFound(model.to_string()))?;
        let index = rows
            .iter()
            .position(|r| selector_matches(selector, r))
            .ok_or_else(|| StorageError::RowNotFound {
                model: model.to_string(),
            })?;
        Ok(rows.remove(index))
    }
}

/// The enforcement engine only needs counting; map storage failures to the
/// domain's backend error so a broken store never passes verification.
#[async_trait]
impl RowCounter for MemoryDataStore {
    async fn count(&self, model: &str, filter: &FilterExpr) -> DomainResult<u64> {
        DataStore::count(self, model, filter)
            .await
            .map_err(|e| DomainError::BackendUnavailable {
                message: e.to_string(),
            })
    }
}

/// In-memory permission source, for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryPermissionSource {
    records: DashMap<String, Vec<PermissionRecord>>,
    unavailable: AtomicBool,
}

impl MemoryPermissionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: PermissionRecord) {
        self.records
            .entry(record.role.clone())
            .or_default()
            .push(record);
    }

    /// Simulates a backend outage: loads fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PermissionSource for MemoryPermissionSource {
    async fn load_permissions(&self, role: &str) -> DomainResult<Vec<PermissionRecord>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::BackendUnavailable {
                message: "permission source unavailable".into(),
            });
        }
        Ok(self
            .records
            .get(role)
            .map(|records| records.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn selector(value: Value) -> Selector {
        Selector::parse(&value).unwrap()
    }

    fn filter(value: Value) -> FilterExpr {
        FilterExpr::parse(&value).unwrap()
    }

    #[tokio::test]
    async fn test_seed_count_and_find() {
        let store = MemoryDataStore::new();
        store.seed(
            "Post",
            vec![
                json!({ "id": 1, "ownerId": "u1" }),
                json!({ "id": 2, "ownerId": "u2" }),
            ],
        );
        let owned = filter(json!({ "ownerId": { "equals": "u1" } }));
        assert_eq!(DataStore::count(&store, "Post", &owned).await.unwrap(), 1);
        let rows = store.find_many("Post", &owned).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(1));
        let row = store
            .find_unique("Post", &selector(json!({ "id": 2 })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["ownerId"], json!("u2"));
    }

    #[tokio::test]
    async fn test_update_and_delete_by_selector() {
        let store = MemoryDataStore::new();
        store.seed("Post", vec![json!({ "id": 1, "title": "a" })]);
        let changes: Row = json!({ "title": "b" }).as_object().cloned().unwrap();
        let updated = store
            .update("Post", &selector(json!({ "id": 1 })), changes)
            .await
            .unwrap();
        assert_eq!(updated["title"], json!("b"));
        store
            .delete("Post", &selector(json!({ "id": 1 })))
            .await
            .unwrap();
        let missing = store
            .delete("Post", &selector(json!({ "id": 1 })))
            .await
            .unwrap_err();
        assert!(matches!(missing, StorageError::RowNotFound { .. }));
    }

    #[tokio::test]
    async fn test_count_on_unknown_model_is_zero() {
        let store = MemoryDataStore::new();
        let all = FilterExpr::default();
        assert_eq!(DataStore::count(&store, "Ghost", &all).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_permission_source_outage_is_an_error() {
        let source = MemoryPermissionSource::new();
        assert!(source.load_permissions("EDITOR").await.unwrap().is_empty());
        source.set_unavailable(true);
        let err = source.load_permissions("EDITOR").await.unwrap_err();
        assert!(matches!(err, DomainError::BackendUnavailable { .. }));
    }
}
