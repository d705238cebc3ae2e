//! Permission policy types.
//!
//! A [`PermissionRecord`] binds (role, model, operation type) to column
//! visibility, allowed operation verbs, forced field values, a row-level
//! check predicate, and per-relation-field operation narrowing. Records are
//! administered externally and read-only to the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::catalog::ModelCatalog;
use crate::error::{DomainError, DomainResult};
use crate::filter::FilterExpr;

/// The operation type a permission record governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermType {
    Read,
    Create,
    Update,
    Delete,
}

impl PermType {
    pub const ALL: [PermType; 4] = [
        PermType::Read,
        PermType::Create,
        PermType::Update,
        PermType::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermType::Read => "READ",
            PermType::Create => "CREATE",
            PermType::Update => "UPDATE",
            PermType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for PermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A forced/default value in a permission's `set` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    /// A literal JSON value. Placeholder strings nested inside object
    /// literals are still resolved at injection time.
    Literal(Value),
    /// The session-identity placeholder (`ctx-userId`).
    SessionUserId,
    /// A named context function (`ctx-fn-<name>`), invoked with
    /// (session, data, field key) when the value is injected.
    ContextFn(String),
}

impl SetValue {
    pub fn parse(value: &Value) -> SetValue {
        if let Some(s) = value.as_str() {
            if s == "ctx-userId" {
                return SetValue::SessionUserId;
            }
            if let Some(name) = s.strip_prefix("ctx-fn-") {
                return SetValue::ContextFn(name.to_string());
            }
        }
        SetValue::Literal(value.clone())
    }
}

/// Narrowing of relation-operation verbs for one relation field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectFieldOps {
    /// The related model the field points at.
    pub model: String,
    /// Allowed relation verbs (`connect`, `disconnect`, `set`,
    /// `connectOrCreate`); anything absent is denied in the projected schema.
    pub allowed: BTreeSet<String>,
}

/// The body of one permission record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PermissionDefinition {
    /// Fields visible to this (role, model, type). Keys of `set` are exempt:
    /// a forced field needs no explicit grant since the policy supplies it.
    pub columns: BTreeSet<String>,
    /// Allowed operation verbs (`findMany`, `createOne`, ...). `None` means
    /// no narrowing: every verb of the operation type is allowed.
    pub ops: Option<BTreeSet<String>>,
    /// Forced/default field values injected into writes.
    pub set: BTreeMap<String, SetValue>,
    /// Row-level predicate restricting which rows this type may touch.
    pub check: Option<FilterExpr>,
    /// Relation-verb narrowing per relation field.
    pub object_fields_ops: BTreeMap<String, ObjectFieldOps>,
}

impl PermissionDefinition {
    /// Parses the JSON shape stored by policy administration.
    pub fn parse(value: &Value) -> DomainResult<PermissionDefinition> {
        let obj = value.as_object().ok_or_else(|| DomainError::Configuration {
            message: "permission definition must be an object".into(),
        })?;
        let mut def = PermissionDefinition::default();
        if let Some(columns) = obj.get("columns") {
            let list = columns
                .as_array()
                .ok_or_else(|| DomainError::Configuration {
                    message: "'columns' must be an array of field names".into(),
                })?;
            def.columns = list
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
        if let Some(ops) = obj.get("ops") {
            if let Some(list) = ops.as_array() {
                def.ops = Some(
                    list.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                );
            }
        }
        if let Some(set) = obj.get("set").and_then(Value::as_object) {
            def.set = set
                .iter()
                .map(|(k, v)| (k.clone(), SetValue::parse(v)))
                .collect();
        }
        if let Some(check) = obj.get("check") {
            def.check = Some(FilterExpr::parse(check).map_err(|e| DomainError::Configuration {
                message: format!("invalid check predicate: {e}"),
            })?);
        }
        if let Some(ofo) = obj.get("objectFieldsOps").and_then(Value::as_object) {
            for (field, spec) in ofo {
                let entry = spec.as_object().ok_or_else(|| DomainError::Configuration {
                    message: format!("objectFieldsOps entry '{field}' must be an object"),
                })?;
                def.object_fields_ops.insert(
                    field.clone(),
                    ObjectFieldOps {
                        model: entry
                            .get("model")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        allowed: entry
                            .get("ops")
                            .and_then(Value::as_array)
                            .map(|list| {
                                list.iter()
                                    .filter_map(|v| v.as_str().map(str::to_string))
                                    .collect()
                            })
                            .unwrap_or_default(),
                    },
                );
            }
        }
        Ok(def)
    }
}

/// One policy entry, unique per (role, model, type).
///
/// Absence of a record for (role, model, type) means that operation type is
/// entirely denied for that model under that role; the denial is enforced by
/// schema projection, which removes the corresponding root fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRecord {
    pub role: String,
    pub model: String,
    pub perm_type: PermType,
    pub def: PermissionDefinition,
}

impl PermissionRecord {
    pub fn new(
        role: impl Into<String>,
        model: impl Into<String>,
        perm_type: PermType,
        def: PermissionDefinition,
    ) -> Self {
        Self {
            role: role.into(),
            model: model.into(),
            perm_type,
            def,
        }
    }
}

/// Validates loaded records against the model catalog, dropping malformed
/// ones with a warning instead of failing the whole catalog load.
pub fn validate_records(
    records: Vec<PermissionRecord>,
    catalog: &ModelCatalog,
) -> Vec<PermissionRecord> {
    records
        .into_iter()
        .filter(|record| match check_record(record, catalog) {
            Ok(()) => true,
            Err(reason) => {
                warn!(
                    role = %record.role,
                    model = %record.model,
                    perm_type = %record.perm_type,
                    %reason,
                    "skipping malformed permission record"
                );
                false
            }
        })
        .collect()
}

fn check_record(record: &PermissionRecord, catalog: &ModelCatalog) -> Result<(), String> {
    let model = catalog
        .model(&record.model)
        .ok_or_else(|| format!("unknown model '{}'", record.model))?;
    for column in &record.def.columns {
        if model.field(column).is_none() {
            return Err(format!("unknown column '{column}'"));
        }
    }
    for field in record.def.object_fields_ops.keys() {
        match model.field(field) {
            Some(def) if def.is_relation() => {}
            Some(_) => return Err(format!("objectFieldsOps field '{field}' is not a relation")),
            None => return Err(format!("unknown relation field '{field}'")),
        }
    }
    Ok(())
}
