//! Recursive enforcement over nested write trees.
//!
//! The walker evaluates policy check predicates against write payloads and
//! verifies referenced rows at every relation verb. Payload evaluation is
//! permissive on absent keys: a check over a field the payload does not carry
//! passes, since the field's persisted value is not being changed. A check
//! clause keyed on a relation field the payload writes is delegated: verbs
//! that reference rows must select rows satisfying the clause's fragment, and
//! nested data is evaluated against the fragment recursively. Row evaluation
//! in the persistence layer is strict; see
//! [`crate::filter::FilterExpr::matches_row`].

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use crate::catalog::ModelCatalog;
use crate::engine::context::OperationContext;
use crate::engine::inject::resolved_check;
use crate::engine::traits::RowCounter;
use crate::engine::verify::{exist_before_and_after, items_exist, require_items_exist};
use crate::error::{DomainError, DomainResult};
use crate::filter::{merge_check_with_where, FieldFilter, FilterClause, FilterExpr};
use crate::payload::{DetachTarget, RelationWrite, WritePayload};
use crate::policy::{PermType, PermissionRecord};
use crate::session::SessionContext;

/// The value a check predicate is evaluated against: a parsed write payload
/// or a raw JSON object.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    Payload(&'a WritePayload),
    Value(&'a Value),
}

impl Candidate<'_> {
    /// Relation fields of a payload hold verbs, not values, and are treated
    /// as absent here; [`Walk::check_item_acl`] delegates their check
    /// fragments to the referenced rows and nested data.
    fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Candidate::Payload(payload) => payload.scalars.get(name),
            Candidate::Value(Value::Object(obj)) => obj.get(name),
            Candidate::Value(_) => None,
        }
    }
}

/// Evaluates a check predicate against a candidate, permissively: a field
/// clause over an absent key holds.
pub fn check_candidate(expr: &FilterExpr, candidate: Candidate<'_>) -> bool {
    expr.clauses.iter().all(|clause| match clause {
        FilterClause::And(subs) => subs.iter().all(|s| check_candidate(s, candidate)),
        FilterClause::Or(subs) => subs.iter().any(|s| check_candidate(s, candidate)),
        FilterClause::Not(sub) => !check_candidate(sub, candidate),
        FilterClause::Field(name, filter) => match candidate.get(name) {
            None => true,
            Some(value) => check_field(filter, value),
        },
    })
}

fn check_field(filter: &FieldFilter, value: &Value) -> bool {
    match filter {
        FieldFilter::Conditions(conditions) => conditions.iter().all(|c| c.matches(value)),
        // a present non-object under a relation filter is a shape mismatch
        // and fails closed
        FieldFilter::Relation(expr) => match value {
            Value::Object(_) => check_candidate(expr, Candidate::Value(value)),
            _ => false,
        },
    }
}

/// One enforcement walk: immutable references to the collaborators plus the
/// role's permission records.
pub struct Walk<'a, S: RowCounter + ?Sized> {
    pub store: &'a S,
    pub session: &'a dyn SessionContext,
    pub records: &'a [PermissionRecord],
    pub models: &'a ModelCatalog,
}

impl<'a, S: RowCounter + ?Sized> Walk<'a, S> {
    pub fn new(
        store: &'a S,
        session: &'a dyn SessionContext,
        records: &'a [PermissionRecord],
        models: &'a ModelCatalog,
    ) -> Self {
        Self {
            store,
            session,
            records,
            models,
        }
    }

    fn record(&self, model: &str, perm_type: PermType) -> Option<&'a PermissionRecord> {
        self.records
            .iter()
            .find(|r| r.model == model && r.perm_type == perm_type)
    }

    async fn check_for(&self, model: &str, perm_type: PermType) -> DomainResult<Option<FilterExpr>> {
        resolved_check(self.session, self.records, model, perm_type).await
    }

    /// Evaluates the context's check predicate against a candidate.
    ///
    /// Absence of a permission record passes: total denial of an operation
    /// type is enforced by schema projection, not by the walk.
    pub async fn check_item_acl(
        &self,
        ctx: &OperationContext,
        candidate: Candidate<'_>,
    ) -> DomainResult<()> {
        let Some(record) = self.record(&ctx.model, ctx.perm_type) else {
            return Ok(());
        };
        let Some(check) = record.def.check.as_ref() else {
            return Ok(());
        };
        let check = super::inject::resolve_check(self.session, check).await?;
        let passed = match candidate {
            Candidate::Payload(payload) => self.check_payload(&ctx.model, &check, payload).await?,
            Candidate::Value(_) => check_candidate(&check, candidate),
        };
        if passed {
            Ok(())
        } else {
            Err(DomainError::PermissionOrNotFound {
                perm_type: ctx.perm_type,
            })
        }
    }

    /// Evaluates a resolved check predicate against a write payload,
    /// delegating relation-keyed clauses to the verbs below them.
    fn check_payload<'b>(
        &'b self,
        model: &'b str,
        expr: &'b FilterExpr,
        payload: &'b WritePayload,
    ) -> BoxFuture<'b, DomainResult<bool>> {
        Box::pin(async move {
            for clause in &expr.clauses {
                if !self.check_payload_clause(model, clause, payload).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    async fn check_payload_clause(
        &self,
        model: &str,
        clause: &FilterClause,
        payload: &WritePayload,
    ) -> DomainResult<bool> {
        match clause {
            FilterClause::And(subs) => {
                for sub in subs {
                    if !self.check_payload(model, sub, payload).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterClause::Or(subs) => {
                for sub in subs {
                    if self.check_payload(model, sub, payload).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            FilterClause::Not(sub) => Ok(!self.check_payload(model, sub, payload).await?),
            FilterClause::Field(name, filter) => {
                if let Some(value) = payload.scalars.get(name) {
                    return Ok(check_field(filter, value));
                }
                let Some(writes) = payload.relations.get(name) else {
                    return Ok(true);
                };
                // a scalar condition over a verb object is a shape mismatch
                let FieldFilter::Relation(fragment) = filter else {
                    return Ok(false);
                };
                let Some(related) = self.models.relation_model(model, name) else {
                    warn!(model = %model, field = %name, "unknown relation field, skipping");
                    return Ok(true);
                };
                for write in writes {
                    if !self.write_satisfies(related, fragment, write).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Whether one relation verb satisfies the check fragment governing its
    /// field: referenced rows must exist under the fragment, nested data must
    /// evaluate against it.
    async fn write_satisfies(
        &self,
        related: &str,
        fragment: &FilterExpr,
        write: &RelationWrite,
    ) -> DomainResult<bool> {
        match write {
            RelationWrite::Connect(selectors) | RelationWrite::Set(selectors) => {
                items_exist(self.store, related, Some(fragment), selectors).await
            }
            RelationWrite::Disconnect(DetachTarget::Selectors(selectors))
            | RelationWrite::Delete(DetachTarget::Selectors(selectors)) => {
                items_exist(self.store, related, Some(fragment), selectors).await
            }
            RelationWrite::Disconnect(DetachTarget::Toggle(_))
            | RelationWrite::Delete(DetachTarget::Toggle(_))
            | RelationWrite::DeleteMany(_) => Ok(true),
            RelationWrite::Create(items) | RelationWrite::CreateMany(items) => {
                for item in items {
                    if !self.check_payload(related, fragment, item).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RelationWrite::Update(items) => {
                for item in items {
                    if !self.check_payload(related, fragment, &item.data).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RelationWrite::UpdateMany(items) => {
                for item in items {
                    if !self.check_payload(related, fragment, &item.data).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RelationWrite::Upsert(items) => {
                for item in items {
                    if !self.check_payload(related, fragment, &item.create).await?
                        || !self.check_payload(related, fragment, &item.update).await?
                    {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RelationWrite::ConnectOrCreate(items) => {
                for item in items {
                    if !self.check_payload(related, fragment, &item.create).await? {
                        return Ok(false);
                    }
                    let existing = exist_before_and_after(
                        self.store,
                        related,
                        &item.selector,
                        Some(fragment),
                        PermType::Create,
                    )
                    .await;
                    match existing {
                        Ok(()) => {}
                        Err(DomainError::PermissionOrNotFound { .. }) => return Ok(false),
                        Err(err) => return Err(err),
                    }
                }
                Ok(true)
            }
        }
    }

    async fn require_exists(
        &self,
        model: &str,
        perm_type: PermType,
        selectors: &[crate::filter::Selector],
    ) -> DomainResult<()> {
        let check = self.check_for(model, perm_type).await?;
        require_items_exist(self.store, model, check.as_ref(), selectors, perm_type).await
    }

    /// Walks every relation verb of a payload: referenced rows are verified
    /// to exist under the governing check, and nested create/update data is
    /// recursively held to its own model's checks.
    pub fn check_nested_ops<'b>(
        &'b self,
        ctx: &'b OperationContext,
        payload: &'b WritePayload,
    ) -> BoxFuture<'b, DomainResult<()>> {
        Box::pin(async move {
            for (field, writes) in &payload.relations {
                let Some(related) = self.models.relation_model(&ctx.model, field) else {
                    warn!(model = %ctx.model, field = %field, "unknown relation field, skipping");
                    continue;
                };
                for write in writes {
                    match write {
                        RelationWrite::Connect(selectors) | RelationWrite::Set(selectors) => {
                            self.require_exists(related, PermType::Read, selectors).await?;
                        }
                        RelationWrite::Disconnect(DetachTarget::Toggle(_)) => {}
                        RelationWrite::Disconnect(DetachTarget::Selectors(selectors)) => {
                            self.require_exists(related, PermType::Read, selectors).await?;
                        }
                        RelationWrite::Delete(DetachTarget::Toggle(_)) => {}
                        RelationWrite::Delete(DetachTarget::Selectors(selectors)) => {
                            self.require_exists(related, PermType::Delete, selectors).await?;
                        }
                        RelationWrite::Create(items) | RelationWrite::CreateMany(items) => {
                            let child = ctx.relation(related);
                            for item in items {
                                self.check_item_acl(&child, Candidate::Payload(item)).await?;
                                self.check_nested_ops(&child, item).await?;
                            }
                        }
                        RelationWrite::Update(items) => {
                            let child = ctx.relation(related).with_perm(PermType::Update);
                            for item in items {
                                if let Some(selector) = &item.selector {
                                    self.require_exists(
                                        related,
                                        PermType::Update,
                                        std::slice::from_ref(selector),
                                    )
                                    .await?;
                                }
                                self.check_item_acl(&child, Candidate::Payload(&item.data))
                                    .await?;
                                self.check_nested_ops(&child, &item.data).await?;
                            }
                        }
                        RelationWrite::UpdateMany(items) => {
                            let child = ctx.relation(related).with_perm(PermType::Update);
                            for item in items {
                                self.check_item_acl(&child, Candidate::Payload(&item.data))
                                    .await?;
                                self.check_nested_ops(&child, &item.data).await?;
                            }
                        }
                        RelationWrite::DeleteMany(_) => {}
                        RelationWrite::Upsert(items) => {
                            let create_ctx = OperationContext::new(related, PermType::Create);
                            let update_ctx = OperationContext::new(related, PermType::Update);
                            for item in items {
                                self.check_item_acl(&create_ctx, Candidate::Payload(&item.create))
                                    .await?;
                                self.check_nested_ops(&create_ctx, &item.create).await?;
                                self.check_item_acl(&update_ctx, Candidate::Payload(&item.update))
                                    .await?;
                                self.check_nested_ops(&update_ctx, &item.update).await?;
                                if let Some(selector) = &item.selector {
                                    let check = self.check_for(related, PermType::Update).await?;
                                    exist_before_and_after(
                                        self.store,
                                        related,
                                        selector,
                                        check.as_ref(),
                                        PermType::Update,
                                    )
                                    .await?;
                                }
                            }
                        }
                        RelationWrite::ConnectOrCreate(items) => {
                            let create_ctx = OperationContext::new(related, PermType::Create);
                            for item in items {
                                self.check_item_acl(&create_ctx, Candidate::Payload(&item.create))
                                    .await?;
                                self.check_nested_ops(&create_ctx, &item.create).await?;
                                // a pre-existing row is connected under the
                                // create-side policy
                                let check = self.check_for(related, PermType::Create).await?;
                                exist_before_and_after(
                                    self.store,
                                    related,
                                    &item.selector,
                                    check.as_ref(),
                                    PermType::Create,
                                )
                                .await?;
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Rewrites the bulk verbs one level below an update payload, conjoining
    /// the related model's check predicate into their filters so the
    /// persistence layer can only touch permitted rows.
    pub async fn merge_nested_bulk_filters(
        &self,
        ctx: &OperationContext,
        payload: &mut WritePayload,
    ) -> DomainResult<()> {
        for (field, writes) in payload.relations.iter_mut() {
            let Some(related) = self.models.relation_model(&ctx.model, field) else {
                warn!(model = %ctx.model, field = %field, "unknown relation field, skipping");
                continue;
            };
            for write in writes {
                match write {
                    RelationWrite::UpdateMany(items) => {
                        if let Some(check) = self.check_for(related, PermType::Update).await? {
                            for item in items {
                                item.filter = merge_check_with_where(
                                    Some(std::mem::take(&mut item.filter)),
                                    &check,
                                );
                            }
                        }
                    }
                    RelationWrite::DeleteMany(filters) => {
                        if let Some(check) = self.check_for(related, PermType::Delete).await? {
                            for filter in filters {
                                *filter =
                                    merge_check_with_where(Some(std::mem::take(filter)), &check);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use serde_json::{json, Map};

    use super::*;
    use crate::catalog::{FieldDef, ModelDef};
    use crate::policy::PermissionDefinition;
    use crate::session::Session;

    fn parse_check(value: Value) -> FilterExpr {
        FilterExpr::parse(&value).unwrap()
    }

    #[test]
    fn test_absent_key_is_permissive() {
        let check = parse_check(json!({ "ownerId": { "equals": "u1" } }));
        let payload = WritePayload::parse(&json!({ "title": "t" })).unwrap();
        assert!(check_candidate(&check, Candidate::Payload(&payload)));
    }

    #[test]
    fn test_present_key_is_enforced() {
        let check = parse_check(json!({ "ownerId": { "equals": "u1" } }));
        let mine = WritePayload::parse(&json!({ "ownerId": "u1" })).unwrap();
        let forged = WritePayload::parse(&json!({ "ownerId": "u2" })).unwrap();
        assert!(check_candidate(&check, Candidate::Payload(&mine)));
        assert!(!check_candidate(&check, Candidate::Payload(&forged)));
    }

    #[test]
    fn test_combinators_over_payload() {
        let check = parse_check(json!({
            "OR": [
                { "status": { "equals": "draft" } },
                { "status": { "equals": "review" } }
            ],
            "NOT": { "locked": { "equals": true } }
        }));
        let ok = WritePayload::parse(&json!({ "status": "draft", "locked": false })).unwrap();
        assert!(check_candidate(&check, Candidate::Payload(&ok)));
        let locked = WritePayload::parse(&json!({ "status": "draft", "locked": true })).unwrap();
        assert!(!check_candidate(&check, Candidate::Payload(&locked)));
        // NOT negates the permissive inner result, so an absent key denies
        let unlocked_absent = WritePayload::parse(&json!({ "status": "draft" })).unwrap();
        assert!(!check_candidate(&check, Candidate::Payload(&unlocked_absent)));
        let empty_or = parse_check(json!({ "OR": [] }));
        assert!(!check_candidate(&empty_or, Candidate::Payload(&ok)));
    }

    #[test]
    fn test_relation_delegation_over_values() {
        let check = parse_check(json!({ "author": { "id": { "equals": "u1" } } }));
        let value = json!({ "author": { "id": "u1", "name": "a" } });
        assert!(check_candidate(&check, Candidate::Value(&value)));
        let other = json!({ "author": { "id": "u2" } });
        assert!(!check_candidate(&check, Candidate::Value(&other)));
        // scalar where an object is expected never matches
        let scalar = json!({ "author": "u1" });
        assert!(!check_candidate(&check, Candidate::Value(&scalar)));
    }

    struct RowStore {
        rows: BTreeMap<String, Vec<Map<String, Value>>>,
    }

    #[async_trait]
    impl RowCounter for RowStore {
        async fn count(&self, model: &str, filter: &FilterExpr) -> DomainResult<u64> {
            Ok(self
                .rows
                .get(model)
                .map(|rows| rows.iter().filter(|r| filter.matches_row(r)).count() as u64)
                .unwrap_or(0))
        }
    }

    fn models() -> ModelCatalog {
        ModelCatalog::new(vec![
            ModelDef::new(
                "User",
                vec![
                    FieldDef::scalar("id", "String"),
                    FieldDef::relation("posts", "Post", true),
                ],
            ),
            ModelDef::new(
                "Post",
                vec![
                    FieldDef::scalar("id", "String"),
                    FieldDef::scalar("ownerId", "String"),
                    FieldDef::scalar("title", "String"),
                    FieldDef::relation("author", "User", false),
                ],
            ),
        ])
    }

    fn read_check_record(model: &str, perm_type: PermType, check: Value) -> PermissionRecord {
        PermissionRecord::new(
            "EDITOR",
            model,
            perm_type,
            PermissionDefinition::parse(&json!({ "check": check })).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_connect_requires_readable_row() {
        let store = RowStore {
            rows: [(
                "Post".to_string(),
                vec![json!({ "id": "p1", "ownerId": "u2" })
                    .as_object()
                    .cloned()
                    .unwrap()],
            )]
            .into_iter()
            .collect(),
        };
        let session = Session::new("u1", "EDITOR");
        let records = [read_check_record(
            "Post",
            PermType::Read,
            json!({ "ownerId": { "equals": "ctx-userId" } }),
        )];
        let catalog = models();
        let walk = Walk::new(&store, &session, &records, &catalog);
        let ctx = OperationContext::new("User", PermType::Update);
        let payload = WritePayload::parse(&json!({
            "posts": { "connect": { "id": "p1" } }
        }))
        .unwrap();
        let err = walk.check_nested_ops(&ctx, &payload).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::PermissionOrNotFound {
                perm_type: PermType::Read
            }
        ));
    }

    #[tokio::test]
    async fn test_relation_check_constrains_connect_and_create() {
        let store = RowStore {
            rows: [(
                "User".to_string(),
                vec![
                    json!({ "id": "u1" }).as_object().cloned().unwrap(),
                    json!({ "id": "u2" }).as_object().cloned().unwrap(),
                ],
            )]
            .into_iter()
            .collect(),
        };
        let session = Session::new("u1", "EDITOR");
        let records = [read_check_record(
            "Post",
            PermType::Create,
            json!({ "author": { "id": { "equals": "ctx-userId" } } }),
        )];
        let catalog = models();
        let walk = Walk::new(&store, &session, &records, &catalog);
        let ctx = OperationContext::new("Post", PermType::Create);

        let mine = WritePayload::parse(&json!({
            "title": "t",
            "author": { "connect": { "id": "u1" } }
        }))
        .unwrap();
        walk.check_item_acl(&ctx, Candidate::Payload(&mine)).await.unwrap();

        // connecting a row outside the check fragment is denied
        let foreign = WritePayload::parse(&json!({
            "title": "t",
            "author": { "connect": { "id": "u2" } }
        }))
        .unwrap();
        let err = walk
            .check_item_acl(&ctx, Candidate::Payload(&foreign))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::PermissionOrNotFound {
                perm_type: PermType::Create
            }
        ));

        // nested create data is held to the fragment too
        let forged = WritePayload::parse(&json!({
            "title": "t",
            "author": { "create": { "id": "u3" } }
        }))
        .unwrap();
        let err = walk
            .check_item_acl(&ctx, Candidate::Payload(&forged))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::PermissionOrNotFound {
                perm_type: PermType::Create
            }
        ));
    }

    #[tokio::test]
    async fn test_nested_create_held_to_own_check() {
        let store = RowStore {
            rows: BTreeMap::new(),
        };
        let session = Session::new("u1", "EDITOR");
        let records = [read_check_record(
            "Post",
            PermType::Create,
            json!({ "ownerId": { "equals": "ctx-userId" } }),
        )];
        let catalog = models();
        let walk = Walk::new(&store, &session, &records, &catalog);
        let ctx = OperationContext::new("User", PermType::Create);
        let ok = WritePayload::parse(&json!({
            "posts": { "create": { "title": "t", "ownerId": "u1" } }
        }))
        .unwrap();
        walk.check_nested_ops(&ctx, &ok).await.unwrap();
        let forged = WritePayload::parse(&json!({
            "posts": { "create": { "title": "t", "ownerId": "u2" } }
        }))
        .unwrap();
        let err = walk.check_nested_ops(&ctx, &forged).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::PermissionOrNotFound {
                perm_type: PermType::Create
            }
        ));
    }

    #[tokio::test]
    async fn test_connect_or_create_holds_existing_row_to_create_check() {
        let store = RowStore {
            rows: [(
                "Post".to_string(),
                vec![json!({ "id": "p1", "ownerId": "u2" })
                    .as_object()
                    .cloned()
                    .unwrap()],
            )]
            .into_iter()
            .collect(),
        };
        let session = Session::new("u1", "EDITOR");
        let records = [read_check_record(
            "Post",
            PermType::Create,
            json!({ "ownerId": { "equals": "ctx-userId" } }),
        )];
        let catalog = models();
        let walk = Walk::new(&store, &session, &records, &catalog);
        let ctx = OperationContext::new("User", PermType::Update);

        let existing_foreign = WritePayload::parse(&json!({
            "posts": {
                "connectOrCreate": {
                    "where": { "id": "p1" },
                    "create": { "ownerId": "u1", "title": "t" }
                }
            }
        }))
        .unwrap();
        let err = walk
            .check_nested_ops(&ctx, &existing_foreign)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::PermissionOrNotFound {
                perm_type: PermType::Create
            }
        ));

        // absent row: the create branch governs, nothing pre-exists to verify
        let fresh = WritePayload::parse(&json!({
            "posts": {
                "connectOrCreate": {
                    "where": { "id": "p9" },
                    "create": { "ownerId": "u1", "title": "t" }
                }
            }
        }))
        .unwrap();
        walk.check_nested_ops(&ctx, &fresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_filters_gain_check_conjunct() {
        let store = RowStore {
            rows: BTreeMap::new(),
        };
        let session = Session::new("u1", "EDITOR");
        let records = [read_check_record(
            "Post",
            PermType::Update,
            json!({ "ownerId": { "equals": "ctx-userId" } }),
        )];
        let catalog = models();
        let walk = Walk::new(&store, &session, &records, &catalog);
        let ctx = OperationContext::new("User", PermType::Update);
        let mut payload = WritePayload::parse(&json!({
            "posts": {
                "updateMany": {
                    "where": { "title": { "contains": "x" } },
                    "data": { "title": "y" }
                }
            }
        }))
        .unwrap();
        walk.merge_nested_bulk_filters(&ctx, &mut payload).await.unwrap();
        let writes = &payload.relations["posts"];
        let item = writes
            .iter()
            .find_map(|w| match w {
                RelationWrite::UpdateMany(items) => Some(&items[0]),
                _ => None,
            })
            .unwrap();
        let mine = json!({ "title": "x1", "ownerId": "u1" }).as_object().cloned().unwrap();
        let foreign = json!({ "title": "x1", "ownerId": "u2" }).as_object().cloned().unwrap();
        assert!(item.filter.matches_row(&mine));
        assert!(!item.filter.matches_row(&foreign));
    }
}
