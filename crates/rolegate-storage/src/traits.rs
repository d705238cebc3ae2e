//! DataStore trait definition.

use async_trait::async_trait;
use serde_json::{Map, Value};

use rolegate_domain::filter::{FilterExpr, Selector};

use crate::error::StorageResult;

/// One stored row: flat field name to JSON value.
pub type Row = Map<String, Value>;

/// Row-oriented persistence, keyed by model name.
///
/// Filters arrive in the parsed form produced by the domain crate; backends
/// translate them to their native query language (the in-memory backend
/// evaluates them directly).
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Counts rows matching a filter.
    async fn count(&self, model: &str, filter: &FilterExpr) -> StorageResult<u64>;

    /// Fetches the row matching a unique selector, if any.
    async fn find_unique(&self, model: &str, selector: &Selector) -> StorageResult<Option<Row>>;

    /// Fetches every row matching a filter.
    async fn find_many(&self, model: &str, filter: &FilterExpr) -> StorageResult<Vec<Row>>;

    /// Inserts a row and returns it.
    async fn create(&self, model: &str, row: Row) -> StorageResult<Row>;

    /// Applies field changes to the row matching a unique selector and
    /// returns the updated row.
    async fn update(&self, model: &str, selector: &Selector, changes: Row) -> StorageResult<Row>;

    /// Deletes the row matching a unique selector and returns it.
    async fn delete(&self, model: &str, selector: &Selector) -> StorageResult<Row>;
}
