//! Persistence collaborator interface.

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::filter::FilterExpr;

/// Counts rows matching a filter.
///
/// This is the only question the enforcement engine ever asks the
/// persistence layer: existence verification is expressed entirely as
/// counting under merged predicates. Reads and writes themselves are executed
/// by the host after enforcement rewrites the operation.
#[async_trait]
pub trait RowCounter: Send + Sync {
    async fn count(&self, model: &str, filter: &FilterExpr) -> DomainResult<u64>;
}
