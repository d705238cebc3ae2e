//! Operation enforcement.
//!
//! [`Enforcer::enforce`] takes an incoming operation, applies the session
//! role's policy to it, and returns the rewritten operation for the host to
//! execute: filters gain check conjuncts, payloads gain forced values, and
//! referenced rows are verified to exist under the governing checks. A failed
//! verification aborts the whole operation before anything is written.

pub mod context;
pub mod inject;
pub mod traits;
pub mod verify;
pub mod walker;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DomainError, DomainResult};
use crate::filter::{merge_check_with_where, FilterExpr, Selector};
use crate::payload::WritePayload;
use crate::perms::{PermissionCatalog, PermissionSource};
use crate::policy::PermType;
use crate::session::SessionContext;

pub use context::OperationContext;
pub use traits::RowCounter;
pub use walker::{check_candidate, Candidate, Walk};

use inject::{resolved_check, set_perm_values, set_perm_values_one_level};
use verify::{exist_before_and_after, require_items_exist};

/// One field of a selection tree: an optional sub-selection and an optional
/// filter on a list relation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectField {
    pub select: Option<SelectTree>,
    pub filter: Option<FilterExpr>,
}

/// A parsed selection tree (`select: { author: { select: ... } }`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectTree {
    pub fields: BTreeMap<String, SelectField>,
}

impl SelectTree {
    pub fn parse(value: &Value) -> DomainResult<SelectTree> {
        let obj = value
            .as_object()
            .ok_or_else(|| DomainError::invalid_payload("'select' must be an object"))?;
        let mut fields = BTreeMap::new();
        for (name, entry) in obj {
            match entry {
                Value::Bool(true) => {
                    fields.insert(name.clone(), SelectField::default());
                }
                Value::Bool(false) => {}
                Value::Object(spec) => {
                    fields.insert(
                        name.clone(),
                        SelectField {
                            select: spec.get("select").map(SelectTree::parse).transpose()?,
                            filter: spec.get("where").map(FilterExpr::parse).transpose()?,
                        },
                    );
                }
                _ => {
                    return Err(DomainError::invalid_payload(format!(
                        "'select' entry '{name}' must be a boolean or an object"
                    )))
                }
            }
        }
        Ok(SelectTree { fields })
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        for (name, field) in &self.fields {
            if field.select.is_none() && field.filter.is_none() {
                obj.insert(name.clone(), Value::Bool(true));
                continue;
            }
            let mut spec = Map::new();
            if let Some(select) = &field.select {
                spec.insert("select".into(), select.to_value());
            }
            if let Some(filter) = &field.filter {
                spec.insert("where".into(), filter.to_value());
            }
            obj.insert(name.clone(), Value::Object(spec));
        }
        Value::Object(obj)
    }
}

/// One operation against a model, as received from the API layer and as
/// returned rewritten by enforcement.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    FindUnique {
        selector: Selector,
        select: Option<SelectTree>,
    },
    FindFirst {
        filter: Option<FilterExpr>,
        select: Option<SelectTree>,
    },
    FindMany {
        filter: Option<FilterExpr>,
        select: Option<SelectTree>,
    },
    Count {
        filter: Option<FilterExpr>,
    },
    Aggregate {
        filter: Option<FilterExpr>,
    },
    CreateOne {
        data: WritePayload,
        select: Option<SelectTree>,
    },
    CreateMany {
        data: Vec<WritePayload>,
    },
    UpdateOne {
        selector: Selector,
        data: WritePayload,
        select: Option<SelectTree>,
    },
    UpdateMany {
        filter: Option<FilterExpr>,
        data: WritePayload,
    },
    UpsertOne {
        selector: Selector,
        create: WritePayload,
        update: WritePayload,
        select: Option<SelectTree>,
    },
    DeleteOne {
        selector: Selector,
    },
    DeleteMany {
        filter: Option<FilterExpr>,
    },
}

/// Enforcer configuration.
#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    /// Role that bypasses enforcement entirely. `None` disables the bypass.
    pub bypass_role: Option<String>,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            bypass_role: Some("ROOT".to_string()),
        }
    }
}

/// The enforcement engine, generic over the persistence counter and the
/// permission source.
pub struct Enforcer<S, P> {
    store: Arc<S>,
    perms: Arc<PermissionCatalog<P>>,
    config: EnforcerConfig,
}

impl<S, P> Enforcer<S, P>
where
    S: RowCounter + 'static,
    P: PermissionSource + 'static,
{
    pub fn new(store: Arc<S>, perms: Arc<PermissionCatalog<P>>, config: EnforcerConfig) -> Self {
        Self {
            store,
            perms,
            config,
        }
    }

    pub fn permission_catalog(&self) -> &Arc<PermissionCatalog<P>> {
        &self.perms
    }

    /// Applies the session role's policy to an operation and returns it
    /// rewritten for execution.
    pub async fn enforce(
        &self,
        session: &dyn SessionContext,
        model: &str,
        op: Operation,
    ) -> DomainResult<Operation> {
        if self
            .config
            .bypass_role
            .as_deref()
            .is_some_and(|bypass| bypass == session.role())
        {
            return Ok(op);
        }
        debug!(role = %session.role(), model = %model, "enforcing operation");

        let records = self.perms.permissions(session.role()).await?;
        let models = Arc::clone(self.perms.model_catalog());
        let walk = Walk::new(
            self.store.as_ref(),
            session,
            records.as_slice(),
            models.as_ref(),
        );

        match op {
            Operation::FindMany { filter, mut select } => {
                let filter = merged_read_filter(&walk, model, filter).await?;
                merge_select(&walk, model, &mut select).await?;
                Ok(Operation::FindMany { filter, select })
            }
            Operation::FindFirst { filter, mut select } => {
                let filter = merged_read_filter(&walk, model, filter).await?;
                merge_select(&walk, model, &mut select).await?;
                Ok(Operation::FindFirst { filter, select })
            }
            Operation::Count { filter } => {
                let filter = merged_read_filter(&walk, model, filter).await?;
                Ok(Operation::Count { filter })
            }
            Operation::Aggregate { filter } => {
                let filter = merged_read_filter(&walk, model, filter).await?;
                Ok(Operation::Aggregate { filter })
            }
            Operation::FindUnique { selector, mut select } => {
                let check = resolved_check(session, walk.records, model, PermType::Read).await?;
                require_items_exist(
                    self.store.as_ref(),
                    model,
                    check.as_ref(),
                    std::slice::from_ref(&selector),
                    PermType::Read,
                )
                .await?;
                merge_select(&walk, model, &mut select).await?;
                Ok(Operation::FindUnique { selector, select })
            }
            Operation::CreateOne { mut data, mut select } => {
                set_perm_values(
                    session,
                    walk.records,
                    walk.models,
                    model,
                    PermType::Create,
                    &mut data,
                )
                .await?;
                let ctx = OperationContext::new(model, PermType::Create);
                walk.check_item_acl(&ctx, Candidate::Payload(&data)).await?;
                walk.check_nested_ops(&ctx, &data).await?;
                merge_select(&walk, model, &mut select).await?;
                Ok(Operation::CreateOne { data, select })
            }
            Operation::CreateMany { mut data } => {
                let ctx = OperationContext::new(model, PermType::Create);
                let record = walk
                    .records
                    .iter()
                    .find(|r| r.model == model && r.perm_type == PermType::Create);
                for item in &mut data {
                    set_perm_values_one_level(session, record, item).await?;
                }
                for item in &data {
                    walk.check_item_acl(&ctx, Candidate::Payload(item)).await?;
                }
                Ok(Operation::CreateMany { data })
            }
            Operation::UpdateOne {
                selector,
                mut data,
                mut select,
            } => {
                let check = resolved_check(session, walk.records, model, PermType::Update).await?;
                require_items_exist(
                    self.store.as_ref(),
                    model,
                    check.as_ref(),
                    std::slice::from_ref(&selector),
                    PermType::Update,
                )
                .await?;
                set_perm_values(
                    session,
                    walk.records,
                    walk.models,
                    model,
                    PermType::Update,
                    &mut data,
                )
                .await?;
                let ctx = OperationContext::new(model, PermType::Update);
                walk.check_item_acl(&ctx, Candidate::Payload(&data)).await?;
                walk.merge_nested_bulk_filters(&ctx, &mut data).await?;
                walk.check_nested_ops(&ctx, &data).await?;
                merge_select(&walk, model, &mut select).await?;
                Ok(Operation::UpdateOne {
                    selector,
                    data,
                    select,
                })
            }
            Operation::UpdateMany { filter, mut data } => {
                let check = resolved_check(session, walk.records, model, PermType::Update).await?;
                let filter = match &check {
                    Some(check) => Some(merge_check_with_where(filter, check)),
                    None => filter,
                };
                let record = walk
                    .records
                    .iter()
                    .find(|r| r.model == model && r.perm_type == PermType::Update);
                set_perm_values_one_level(session, record, &mut data).await?;
                let ctx = OperationContext::new(model, PermType::Update);
                walk.check_item_acl(&ctx, Candidate::Payload(&data)).await?;
                Ok(Operation::UpdateMany { filter, data })
            }
            Operation::UpsertOne {
                selector,
                mut create,
                mut update,
                mut select,
            } => {
                let check = resolved_check(session, walk.records, model, PermType::Update).await?;
                exist_before_and_after(
                    self.store.as_ref(),
                    model,
                    &selector,
                    check.as_ref(),
                    PermType::Update,
                )
                .await?;
                set_perm_values(
                    session,
                    walk.records,
                    walk.models,
                    model,
                    PermType::Create,
                    &mut create,
                )
                .await?;
                set_perm_values(
                    session,
                    walk.records,
                    walk.models,
                    model,
                    PermType::Update,
                    &mut update,
                )
                .await?;
                let create_ctx = OperationContext::new(model, PermType::Create);
                walk.check_item_acl(&create_ctx, Candidate::Payload(&create))
                    .await?;
                walk.check_nested_ops(&create_ctx, &create).await?;
                let update_ctx = OperationContext::new(model, PermType::Update);
                walk.check_item_acl(&update_ctx, Candidate::Payload(&update))
                    .await?;
                walk.merge_nested_bulk_filters(&update_ctx, &mut update).await?;
                walk.check_nested_ops(&update_ctx, &update).await?;
                merge_select(&walk, model, &mut select).await?;
                Ok(Operation::UpsertOne {
                    selector,
                    create,
                    update,
                    select,
                })
            }
            Operation::DeleteOne { selector } => {
                let check = resolved_check(session, walk.records, model, PermType::Delete).await?;
                require_items_exist(
                    self.store.as_ref(),
                    model,
                    check.as_ref(),
                    std::slice::from_ref(&selector),
                    PermType::Delete,
                )
                .await?;
                Ok(Operation::DeleteOne { selector })
            }
            Operation::DeleteMany { filter } => {
                let check = resolved_check(session, walk.records, model, PermType::Delete).await?;
                let filter = match &check {
                    Some(check) => Some(merge_check_with_where(filter, check)),
                    None => filter,
                };
                Ok(Operation::DeleteMany { filter })
            }
        }
    }
}

async fn merged_read_filter<S: RowCounter + ?Sized>(
    walk: &Walk<'_, S>,
    model: &str,
    filter: Option<FilterExpr>,
) -> DomainResult<Option<FilterExpr>> {
    match resolved_check(walk.session, walk.records, model, PermType::Read).await? {
        Some(check) => Ok(Some(merge_check_with_where(filter, &check))),
        None => Ok(filter),
    }
}

async fn merge_select<S: RowCounter + ?Sized>(
    walk: &Walk<'_, S>,
    model: &str,
    select: &mut Option<SelectTree>,
) -> DomainResult<()> {
    if let Some(select) = select.as_mut() {
        merge_select_checks(walk, model, select).await?;
    }
    Ok(())
}

/// Conjoins read checks into the `where` of every selected list relation, so
/// included collections are filtered the same way a direct read would be.
fn merge_select_checks<'b, S: RowCounter + ?Sized>(
    walk: &'b Walk<'b, S>,
    model: &'b str,
    select: &'b mut SelectTree,
) -> BoxFuture<'b, DomainResult<()>> {
    Box::pin(async move {
        let Some(def) = walk.models.model(model) else {
            return Ok(());
        };
        for (name, entry) in select.fields.iter_mut() {
            let Some(field) = def.field(name) else {
                continue;
            };
            if !field.is_relation() {
                continue;
            }
            if field.is_list {
                if let Some(check) =
                    resolved_check(walk.session, walk.records, &field.type_name, PermType::Read)
                        .await?
                {
                    entry.filter = Some(merge_check_with_where(entry.filter.take(), &check));
                }
            }
            if let Some(sub) = entry.select.as_mut() {
                merge_select_checks(walk, &field.type_name, sub).await?;
            }
        }
        Ok(())
    })
}
