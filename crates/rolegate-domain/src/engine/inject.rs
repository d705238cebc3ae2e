//! Placeholder resolution and forced-value injection.
//!
//! Policy `set` clauses and `check` predicates may carry the session-identity
//! placeholder (`ctx-userId`) and named context functions (`ctx-fn-<name>`).
//! Both are resolved against the live session at enforcement time, including
//! placeholders nested inside object literals. A placeholder naming an
//! unregistered function is left untouched so the host layer rejects it
//! instead of silently writing the marker string.

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::trace;

use crate::catalog::ModelCatalog;
use crate::error::DomainResult;
use crate::filter::FilterExpr;
use crate::payload::{RelationWrite, WritePayload};
use crate::policy::{PermType, PermissionRecord, SetValue};
use crate::session::SessionContext;

const USER_ID_PLACEHOLDER: &str = "ctx-userId";
const CONTEXT_FN_PREFIX: &str = "ctx-fn-";

/// Resolves placeholders anywhere inside a JSON value. `data` is the payload
/// being written (if any) and `key` the field the value sits under; both are
/// forwarded to context functions.
pub fn resolve_value<'a>(
    session: &'a dyn SessionContext,
    value: &'a Value,
    data: Option<&'a Value>,
    key: &'a str,
) -> BoxFuture<'a, DomainResult<Value>> {
    Box::pin(async move {
        match value {
            Value::String(s) => {
                if s == USER_ID_PLACEHOLDER {
                    return Ok(Value::String(session.user_id().to_string()));
                }
                if let Some(name) = s.strip_prefix(CONTEXT_FN_PREFIX) {
                    return Ok(session
                        .call_context_fn(name, data, key)
                        .await?
                        .unwrap_or_else(|| value.clone()));
                }
                Ok(value.clone())
            }
            Value::Object(obj) => {
                let mut resolved = Map::with_capacity(obj.len());
                for (k, v) in obj {
                    resolved.insert(k.clone(), resolve_value(session, v, data, k).await?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(resolve_value(session, item, data, key).await?);
                }
                Ok(Value::Array(resolved))
            }
            other => Ok(other.clone()),
        }
    })
}

/// Resolves placeholders inside a check predicate's operands.
pub async fn resolve_check(
    session: &dyn SessionContext,
    check: &FilterExpr,
) -> DomainResult<FilterExpr> {
    let resolved = resolve_value(session, &check.to_value(), None, "").await?;
    FilterExpr::parse(&resolved)
}

/// Looks up and resolves the check predicate for (model, type), if any.
pub async fn resolved_check(
    session: &dyn SessionContext,
    records: &[PermissionRecord],
    model: &str,
    perm_type: PermType,
) -> DomainResult<Option<FilterExpr>> {
    let check = records
        .iter()
        .find(|r| r.model == model && r.perm_type == perm_type)
        .and_then(|r| r.def.check.as_ref());
    match check {
        Some(check) => Ok(Some(resolve_check(session, check).await?)),
        None => Ok(None),
    }
}

/// Policy values win over caller values; object values are merged per key so
/// a policy forcing one member of a JSON column does not erase the rest.
fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (k, v) in overlay {
                let entry = match merged.get(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v.clone(),
                };
                merged.insert(k.clone(), entry);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

/// Applies the `set` clause of one permission record to the scalar fields of
/// a payload, without descending into relations.
pub async fn set_perm_values_one_level(
    session: &dyn SessionContext,
    record: Option<&PermissionRecord>,
    payload: &mut WritePayload,
) -> DomainResult<()> {
    let Some(record) = record else {
        return Ok(());
    };
    if record.def.set.is_empty() {
        return Ok(());
    }
    let snapshot = payload.to_value();
    for (key, set_value) in &record.def.set {
        let resolved = match set_value {
            SetValue::SessionUserId => Some(Value::String(session.user_id().to_string())),
            SetValue::ContextFn(name) => {
                let result = session.call_context_fn(name, Some(&snapshot), key).await?;
                if result.is_none() {
                    trace!(function = %name, field = %key, "context function not registered");
                    Some(Value::String(format!("{CONTEXT_FN_PREFIX}{name}")))
                } else {
                    result
                }
            }
            SetValue::Literal(value) => {
                Some(resolve_value(session, value, Some(&snapshot), key).await?)
            }
        };
        if let Some(resolved) = resolved {
            let merged = match payload.scalars.get(key) {
                Some(existing) => deep_merge(existing, &resolved),
                None => resolved,
            };
            payload.scalars.insert(key.clone(), merged);
        }
    }
    Ok(())
}

/// Applies `set` clauses through the whole nested write tree, re-deriving the
/// governing (model, operation type) at every relation verb.
pub fn set_perm_values<'a>(
    session: &'a dyn SessionContext,
    records: &'a [PermissionRecord],
    models: &'a ModelCatalog,
    model: &'a str,
    perm_type: PermType,
    payload: &'a mut WritePayload,
) -> BoxFuture<'a, DomainResult<()>> {
    Box::pin(async move {
        let record = records
            .iter()
            .find(|r| r.model == model && r.perm_type == perm_type);
        set_perm_values_one_level(session, record, payload).await?;

        for (field, writes) in payload.relations.iter_mut() {
            let Some(related) = models.relation_model(model, field) else {
                continue;
            };
            for write in writes {
                match write {
                    RelationWrite::Create(items) | RelationWrite::CreateMany(items) => {
                        for item in items {
                            set_perm_values(session, records, models, related, PermType::Create, item)
                                .await?;
                        }
                    }
                    RelationWrite::Update(items) => {
                        for item in items {
                            set_perm_values(
                                session,
                                records,
                                models,
                                related,
                                PermType::Update,
                                &mut item.data,
                            )
                            .await?;
                        }
                    }
                    RelationWrite::UpdateMany(items) => {
                        for item in items {
                            set_perm_values(
                                session,
                                records,
                                models,
                                related,
                                PermType::Update,
                                &mut item.data,
                            )
                            .await?;
                        }
                    }
                    RelationWrite::Upsert(items) => {
                        for item in items {
                            set_perm_values(
                                session,
                                records,
                                models,
                                related,
                                PermType::Create,
                                &mut item.create,
                            )
                            .await?;
                            set_perm_values(
                                session,
                                records,
                                models,
                                related,
                                PermType::Update,
                                &mut item.update,
                            )
                            .await?;
                        }
                    }
                    RelationWrite::ConnectOrCreate(items) => {
                        for item in items {
                            set_perm_values(
                                session,
                                records,
                                models,
                                related,
                                PermType::Create,
                                &mut item.create,
                            )
                            .await?;
                        }
                    }
                    RelationWrite::Connect(_)
                    | RelationWrite::Set(_)
                    | RelationWrite::Disconnect(_)
                    | RelationWrite::Delete(_)
                    | RelationWrite::DeleteMany(_) => {}
                }
            }
        }
        Ok(())
    })
}
