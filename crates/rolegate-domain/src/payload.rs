//! Nested write payloads.
//!
//! Mutation data arrives as JSON with relation verbs (`create`, `connect`,
//! `upsert`, ...) nested under relation fields to arbitrary depth. The
//! payload is parsed once at the boundary into [`WritePayload`] /
//! [`RelationWrite`]; the walker and the injector match exhaustively over the
//! variants instead of re-inspecting key presence at every level.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};
use crate::filter::{FilterExpr, Selector};

const RELATION_VERBS: &[&str] = &[
    "create",
    "update",
    "delete",
    "upsert",
    "connectOrCreate",
    "connect",
    "disconnect",
    "set",
    "createMany",
    "updateMany",
    "deleteMany",
];

/// Argument of a to-one `disconnect`/`delete`: either the boolean toggle form
/// or explicit selectors.
#[derive(Debug, Clone, PartialEq)]
pub enum DetachTarget {
    Toggle(bool),
    Selectors(Vec<Selector>),
}

/// `update` entry on a relation: optional unique selector plus data.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpdate {
    pub selector: Option<Selector>,
    pub data: WritePayload,
}

/// `updateMany` entry on a relation: filter plus data.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpdateMany {
    pub filter: FilterExpr,
    pub data: WritePayload,
}

/// `upsert` entry on a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpsert {
    pub selector: Option<Selector>,
    pub create: WritePayload,
    pub update: WritePayload,
}

/// `connectOrCreate` entry on a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedConnectOrCreate {
    pub selector: Selector,
    pub create: WritePayload,
}

/// One relation-operation verb under a relation field. Singular and array
/// forms are normalized to vectors at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationWrite {
    Connect(Vec<Selector>),
    Set(Vec<Selector>),
    Disconnect(DetachTarget),
    Delete(DetachTarget),
    Create(Vec<WritePayload>),
    CreateMany(Vec<WritePayload>),
    Update(Vec<NestedUpdate>),
    UpdateMany(Vec<NestedUpdateMany>),
    DeleteMany(Vec<FilterExpr>),
    Upsert(Vec<NestedUpsert>),
    ConnectOrCreate(Vec<NestedConnectOrCreate>),
}

/// A parsed write payload for one model: scalar fields plus relation writes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WritePayload {
    pub scalars: BTreeMap<String, Value>,
    /// Relation field name to its verbs, in the order they appeared.
    pub relations: BTreeMap<String, Vec<RelationWrite>>,
}

fn has_relation_verb(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| RELATION_VERBS.contains(&k.as_str()))
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn parse_selectors(value: &Value) -> DomainResult<Vec<Selector>> {
    as_list(value).into_iter().map(Selector::parse).collect()
}

fn parse_payloads(value: &Value) -> DomainResult<Vec<WritePayload>> {
    as_list(value).into_iter().map(WritePayload::parse).collect()
}

fn object_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

impl WritePayload {
    /// Parses a JSON write payload. An object field whose value carries at
    /// least one relation verb becomes a relation write; everything else is a
    /// scalar. A scalar JSON column whose object value happens to contain a
    /// verb-named key cannot be distinguished here and must be routed around
    /// the grammar by the caller.
    pub fn parse(value: &Value) -> DomainResult<WritePayload> {
        let obj = value
            .as_object()
            .ok_or_else(|| DomainError::invalid_payload("write payload must be an object"))?;
        let mut payload = WritePayload::default();
        for (key, field_value) in obj {
            match field_value.as_object() {
                Some(nested) if has_relation_verb(nested) => {
                    let mut writes = Vec::new();
                    for (verb, arg) in nested {
                        if let Some(write) = RelationWrite::parse(verb, arg)? {
                            writes.push(write);
                        }
                    }
                    payload.relations.insert(key.clone(), writes);
                }
                _ => {
                    payload.scalars.insert(key.clone(), field_value.clone());
                }
            }
        }
        Ok(payload)
    }

    /// Renders the payload back into the JSON wire shape.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        for (key, value) in &self.scalars {
            obj.insert(key.clone(), value.clone());
        }
        for (field, writes) in &self.relations {
            let mut verbs = Map::new();
            for write in writes {
                let (verb, arg) = write.to_entry();
                verbs.insert(verb.to_string(), arg);
            }
            obj.insert(field.clone(), Value::Object(verbs));
        }
        Value::Object(obj)
    }
}

fn one_or_many(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

impl RelationWrite {
    /// Parses one verb entry. Returns `None` for non-verb keys, which are
    /// carried by other parts of the envelope (e.g. `skipDuplicates`).
    pub fn parse(verb: &str, arg: &Value) -> DomainResult<Option<RelationWrite>> {
        let write = match verb {
            "connect" => RelationWrite::Connect(parse_selectors(arg)?),
            "set" => RelationWrite::Set(parse_selectors(arg)?),
            "disconnect" => RelationWrite::Disconnect(parse_detach(arg)?),
            "delete" => RelationWrite::Delete(parse_detach(arg)?),
            "create" => RelationWrite::Create(parse_payloads(arg)?),
            "createMany" => {
                let data = arg
                    .as_object()
                    .and_then(|o| object_field(o, "data"))
                    .ok_or_else(|| {
                        DomainError::invalid_payload("'createMany' expects a 'data' array")
                    })?;
                RelationWrite::CreateMany(parse_payloads(data)?)
            }
            "update" => RelationWrite::Update(
                as_list(arg)
                    .into_iter()
                    .map(parse_nested_update)
                    .collect::<DomainResult<_>>()?,
            ),
            "updateMany" => RelationWrite::UpdateMany(
                as_list(arg)
                    .into_iter()
                    .map(parse_nested_update_many)
                    .collect::<DomainResult<_>>()?,
            ),
            "deleteMany" => RelationWrite::DeleteMany(
                as_list(arg)
                    .into_iter()
                    .map(FilterExpr::parse)
                    .collect::<DomainResult<_>>()?,
            ),
            "upsert" => RelationWrite::Upsert(
                as_list(arg)
                    .into_iter()
                    .map(parse_nested_upsert)
                    .collect::<DomainResult<_>>()?,
            ),
            "connectOrCreate" => RelationWrite::ConnectOrCreate(
                as_list(arg)
                    .into_iter()
                    .map(parse_nested_connect_or_create)
                    .collect::<DomainResult<_>>()?,
            ),
            _ => return Ok(None),
        };
        Ok(Some(write))
    }

    fn to_entry(&self) -> (&'static str, Value) {
        match self {
            RelationWrite::Connect(sels) => (
                "connect",
                one_or_many(sels.iter().map(Selector::to_value).collect()),
            ),
            RelationWrite::Set(sels) => (
                "set",
                Value::Array(sels.iter().map(Selector::to_value).collect()),
            ),
            RelationWrite::Disconnect(target) => ("disconnect", detach_to_value(target)),
            RelationWrite::Delete(target) => ("delete", detach_to_value(target)),
            RelationWrite::Create(payloads) => (
                "create",
                one_or_many(payloads.iter().map(WritePayload::to_value).collect()),
            ),
            RelationWrite::CreateMany(payloads) => {
                let mut envelope = Map::new();
                envelope.insert(
                    "data".into(),
                    Value::Array(payloads.iter().map(WritePayload::to_value).collect()),
                );
                ("createMany", Value::Object(envelope))
            }
            RelationWrite::Update(items) => (
                "update",
                one_or_many(
                    items
                        .iter()
                        .map(|item| {
                            let mut obj = Map::new();
                            if let Some(selector) = &item.selector {
                                obj.insert("where".into(), selector.to_value());
                            }
                            obj.insert("data".into(), item.data.to_value());
                            Value::Object(obj)
                        })
                        .collect(),
                ),
            ),
            RelationWrite::UpdateMany(items) => (
                "updateMany",
                one_or_many(
                    items
                        .iter()
                        .map(|item| {
                            let mut obj = Map::new();
                            obj.insert("where".into(), item.filter.to_value());
                            obj.insert("data".into(), item.data.to_value());
                            Value::Object(obj)
                        })
                        .collect(),
                ),
            ),
            RelationWrite::DeleteMany(filters) => (
                "deleteMany",
                one_or_many(filters.iter().map(FilterExpr::to_value).collect()),
            ),
            RelationWrite::Upsert(items) => (
                "upsert",
                one_or_many(
                    items
                        .iter()
                        .map(|item| {
                            let mut obj = Map::new();
                            if let Some(selector) = &item.selector {
                                obj.insert("where".into(), selector.to_value());
                            }
                            obj.insert("create".into(), item.create.to_value());
                            obj.insert("update".into(), item.update.to_value());
                            Value::Object(obj)
                        })
                        .collect(),
                ),
            ),
            RelationWrite::ConnectOrCreate(items) => (
                "connectOrCreate",
                one_or_many(
                    items
                        .iter()
                        .map(|item| {
                            let mut obj = Map::new();
                            obj.insert("where".into(), item.selector.to_value());
                            obj.insert("create".into(), item.create.to_value());
                            Value::Object(obj)
                        })
                        .collect(),
                ),
            ),
        }
    }
}

fn parse_detach(value: &Value) -> DomainResult<DetachTarget> {
    match value {
        Value::Bool(toggle) => Ok(DetachTarget::Toggle(*toggle)),
        other => Ok(DetachTarget::Selectors(parse_selectors(other)?)),
    }
}

fn detach_to_value(target: &DetachTarget) -> Value {
    match target {
        DetachTarget::Toggle(b) => Value::Bool(*b),
        DetachTarget::Selectors(sels) => {
            one_or_many(sels.iter().map(Selector::to_value).collect())
        }
    }
}

fn parse_nested_update(value: &Value) -> DomainResult<NestedUpdate> {
    let obj = value
        .as_object()
        .ok_or_else(|| DomainError::invalid_payload("'update' entry must be an object"))?;
    match object_field(obj, "data") {
        Some(data) => Ok(NestedUpdate {
            selector: object_field(obj, "where").map(Selector::parse).transpose()?,
            data: WritePayload::parse(data)?,
        }),
        // To-one update shorthand: the object is the data itself.
        None => Ok(NestedUpdate {
            selector: None,
            data: WritePayload::parse(value)?,
        }),
    }
}

fn parse_nested_update_many(value: &Value) -> DomainResult<NestedUpdateMany> {
    let obj = value
        .as_object()
        .ok_or_else(|| DomainError::invalid_payload("'updateMany' entry must be an object"))?;
    Ok(NestedUpdateMany {
        filter: object_field(obj, "where")
            .map(FilterExpr::parse)
            .transpose()?
            .unwrap_or_default(),
        data: object_field(obj, "data")
            .map(WritePayload::parse)
            .transpose()?
            .unwrap_or_default(),
    })
}

fn parse_nested_upsert(value: &Value) -> DomainResult<NestedUpsert> {
    let obj = value
        .as_object()
        .ok_or_else(|| DomainError::invalid_payload("'upsert' entry must be an object"))?;
    Ok(NestedUpsert {
        selector: object_field(obj, "where").map(Selector::parse).transpose()?,
        create: object_field(obj, "create")
            .map(WritePayload::parse)
            .transpose()?
            .unwrap_or_default(),
        update: object_field(obj, "update")
            .map(WritePayload::parse)
            .transpose()?
            .unwrap_or_default(),
    })
}

fn parse_nested_connect_or_create(value: &Value) -> DomainResult<NestedConnectOrCreate> {
    let obj = value
        .as_object()
        .ok_or_else(|| DomainError::invalid_payload("'connectOrCreate' entry must be an object"))?;
    Ok(NestedConnectOrCreate {
        selector: object_field(obj, "where")
            .map(Selector::parse)
            .transpose()?
            .ok_or_else(|| DomainError::invalid_payload("'connectOrCreate' requires 'where'"))?,
        create: object_field(obj, "create")
            .map(WritePayload::parse)
            .transpose()?
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars_and_relations_split() {
        let payload = WritePayload::parse(&json!({
            "title": "hello",
            "tags": ["a", "b"],
            "author": { "connect": { "id": "u1" } }
        }))
        .unwrap();
        assert_eq!(payload.scalars["title"], json!("hello"));
        assert_eq!(payload.scalars["tags"], json!(["a", "b"]));
        match payload.relations["author"].as_slice() {
            [RelationWrite::Connect(sels)] => assert_eq!(sels.len(), 1),
            other => panic!("unexpected writes: {other:?}"),
        }
    }

    #[test]
    fn test_array_forms_normalized() {
        let payload = WritePayload::parse(&json!({
            "posts": {
                "create": [{ "title": "a" }, { "title": "b" }],
                "connect": [{ "id": 1 }, { "id": 2 }]
            }
        }))
        .unwrap();
        let writes = &payload.relations["posts"];
        assert!(writes
            .iter()
            .any(|w| matches!(w, RelationWrite::Create(items) if items.len() == 2)));
        assert!(writes
            .iter()
            .any(|w| matches!(w, RelationWrite::Connect(sels) if sels.len() == 2)));
    }

    #[test]
    fn test_disconnect_toggle_form() {
        let payload = WritePayload::parse(&json!({
            "author": { "disconnect": true }
        }))
        .unwrap();
        match payload.relations["author"].as_slice() {
            [RelationWrite::Disconnect(DetachTarget::Toggle(true))] => {}
            other => panic!("unexpected writes: {other:?}"),
        }
    }

    #[test]
    fn test_nested_update_envelope() {
        let payload = WritePayload::parse(&json!({
            "posts": {
                "update": { "where": { "id": 1 }, "data": { "title": "x" } }
            }
        }))
        .unwrap();
        match payload.relations["posts"].as_slice() {
            [RelationWrite::Update(items)] => {
                assert!(items[0].selector.is_some());
                assert_eq!(items[0].data.scalars["title"], json!("x"));
            }
            other => panic!("unexpected writes: {other:?}"),
        }
    }

    #[test]
    fn test_to_one_update_shorthand() {
        let payload = WritePayload::parse(&json!({
            "profile": { "update": { "bio": "hi" } }
        }))
        .unwrap();
        match payload.relations["profile"].as_slice() {
            [RelationWrite::Update(items)] => {
                assert!(items[0].selector.is_none());
                assert_eq!(items[0].data.scalars["bio"], json!("hi"));
            }
            other => panic!("unexpected writes: {other:?}"),
        }
    }

    #[test]
    fn test_create_many_envelope() {
        let payload = WritePayload::parse(&json!({
            "posts": { "createMany": { "data": [{ "title": "a" }] } }
        }))
        .unwrap();
        match payload.relations["posts"].as_slice() {
            [RelationWrite::CreateMany(items)] => assert_eq!(items.len(), 1),
            other => panic!("unexpected writes: {other:?}"),
        }
    }

    #[test]
    fn test_upsert_requires_both_sides_parsed() {
        let payload = WritePayload::parse(&json!({
            "profile": {
                "upsert": {
                    "where": { "userId": "u1" },
                    "create": { "bio": "new" },
                    "update": { "bio": "changed" }
                }
            }
        }))
        .unwrap();
        match payload.relations["profile"].as_slice() {
            [RelationWrite::Upsert(items)] => {
                assert_eq!(items[0].create.scalars["bio"], json!("new"));
                assert_eq!(items[0].update.scalars["bio"], json!("changed"));
            }
            other => panic!("unexpected writes: {other:?}"),
        }
    }

    #[test]
    fn test_round_trip() {
        let source = json!({
            "title": "hello",
            "author": { "connect": { "id": "u1" } },
            "comments": {
                "createMany": { "data": [{ "body": "a" }, { "body": "b" }] }
            }
        });
        let payload = WritePayload::parse(&source).unwrap();
        let rendered = payload.to_value();
        assert_eq!(WritePayload::parse(&rendered).unwrap(), payload);
    }
}
