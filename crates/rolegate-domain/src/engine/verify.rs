//! Existence verification under policy predicates.
//!
//! Rows referenced by unique selectors (`connect`, `updateOne`, nested
//! `update where`, ...) are verified by counting under the selector merged
//! with the policy's check predicate. A failed verification reports the
//! conflated "not exist or no permission" error, so callers cannot probe for
//! row existence.

use crate::engine::traits::RowCounter;
use crate::error::{DomainError, DomainResult};
use crate::filter::{merge_check_with_where, selectors_to_filter, FilterExpr, Selector};
use crate::policy::PermType;

/// Verifies that the selected rows exist and satisfy the check predicate.
///
/// A single selector passes when at least one row matches it merged with the
/// check. A batch passes only when the check excludes none of the rows the
/// bare selectors match: the batch is counted once unconstrained and once
/// merged, and any shortfall fails the whole batch.
pub async fn items_exist<S: RowCounter + ?Sized>(
    store: &S,
    model: &str,
    check: Option<&FilterExpr>,
    selectors: &[Selector],
) -> DomainResult<bool> {
    if selectors.is_empty() {
        return Ok(true);
    }
    if let [selector] = selectors {
        let merged = merge_check_with_where(check.cloned(), &selector.to_filter());
        return Ok(store.count(model, &merged).await? > 0);
    }
    let batch = selectors_to_filter(selectors);
    let unconstrained = store.count(model, &batch).await?;
    let constrained = match check {
        Some(check) => {
            store
                .count(model, &merge_check_with_where(Some(batch), check))
                .await?
        }
        None => unconstrained,
    };
    Ok(constrained != 0 && constrained >= unconstrained)
}

/// Throwing form of [`items_exist`].
pub async fn require_items_exist<S: RowCounter + ?Sized>(
    store: &S,
    model: &str,
    check: Option<&FilterExpr>,
    selectors: &[Selector],
    perm_type: PermType,
) -> DomainResult<()> {
    if items_exist(store, model, check, selectors).await? {
        Ok(())
    } else {
        Err(DomainError::PermissionOrNotFound { perm_type })
    }
}

/// Verification protocol for two-phase writes (`upsert`, `connectOrCreate`).
///
/// When the selected row does not pre-exist, the create branch governs and
/// nothing is verified here. When it pre-exists and the update-side policy
/// carries a check predicate, the row must also satisfy it.
pub async fn exist_before_and_after<S: RowCounter + ?Sized>(
    store: &S,
    model: &str,
    selector: &Selector,
    check: Option<&FilterExpr>,
    perm_type: PermType,
) -> DomainResult<()> {
    let unconstrained = store.count(model, &selector.to_filter()).await?;
    if unconstrained == 0 {
        return Ok(());
    }
    let Some(check) = check else {
        return Ok(());
    };
    let merged = merge_check_with_where(Some(selector.to_filter()), check);
    if store.count(model, &merged).await? == 0 {
        return Err(DomainError::PermissionOrNotFound { perm_type });
    }
    Ok(())
}
