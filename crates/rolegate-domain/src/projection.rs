//! Schema projection engine.
//!
//! A pure function of (model catalog, permission records for a role) that
//! computes the deny-lists a schema-transform pipeline consumes to derive the
//! role-visible API surface: hidden types and inputs, removed root fields,
//! removed object/input/output fields, and narrowed relation verbs. The
//! engine performs no I/O; the result is cached per role by
//! [`crate::perms::PermissionCatalog`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::catalog::{InputCatalog, InputKind, ModelCatalog};
use crate::policy::{PermType, PermissionRecord};

/// Relation verbs that can be narrowed per relation field.
pub const RELATION_FIELD_OPS: [&str; 4] = ["connect", "disconnect", "set", "connectOrCreate"];

/// Top-level operations, used to render root field names compositionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOp {
    FindUnique,
    FindFirst,
    FindMany,
    Aggregate,
    Count,
    CreateOne,
    CreateMany,
    UpdateOne,
    UpdateMany,
    UpsertOne,
    DeleteOne,
    DeleteMany,
    Subscription,
}

impl RootOp {
    pub fn verb(&self) -> &'static str {
        match self {
            RootOp::FindUnique => "findUnique",
            RootOp::FindFirst => "findFirst",
            RootOp::FindMany => "findMany",
            RootOp::Aggregate => "aggregate",
            RootOp::Count => "count",
            RootOp::CreateOne => "createOne",
            RootOp::CreateMany => "createMany",
            RootOp::UpdateOne => "updateOne",
            RootOp::UpdateMany => "updateMany",
            RootOp::UpsertOne => "upsertOne",
            RootOp::DeleteOne => "deleteOne",
            RootOp::DeleteMany => "deleteMany",
            RootOp::Subscription => "subscribe",
        }
    }

    /// The root field name for this operation on a model.
    pub fn field_name(&self, model: &str) -> String {
        format!("{}{model}", self.verb())
    }
}

/// Object-type field deny entry. Also drives `<Model>ScalarFieldEnum` value
/// suppression in the schema-transform collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelFieldsFilter {
    pub model: String,
    pub fields: BTreeSet<String>,
}

/// Input-type field deny entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputFieldsFilter {
    pub inputs: Vec<String>,
    pub fields: BTreeSet<String>,
}

/// Output-type field deny entry (aggregate output types).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFieldsFilter {
    pub outputs: Vec<String>,
    pub fields: BTreeSet<String>,
}

/// The deny-lists derived for one role. Immutable after construction and
/// shared read-only across requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleSchemaFilters {
    pub types: BTreeSet<String>,
    pub inputs: BTreeSet<String>,
    pub root_fields: BTreeSet<String>,
    pub root_subscription_fields: BTreeSet<String>,
    pub object_fields: Vec<ModelFieldsFilter>,
    pub input_fields: Vec<InputFieldsFilter>,
    pub output_fields: Vec<OutputFieldsFilter>,
}

/// Allow/prevent role annotations carried by non-model root fields
/// (e.g. hand-written queries restricted to administrators).
#[derive(Debug, Clone, PartialEq)]
pub struct RootFieldAnnotation {
    pub field: String,
    pub subscription: bool,
    pub allow_roles: Option<Vec<String>>,
    pub prevent_roles: Option<Vec<String>>,
}

/// Per-record view used during projection: allowed columns minus `set` keys,
/// optional verb narrowing, and relation-verb narrowing.
struct AllowedModel<'a> {
    record: &'a PermissionRecord,
    fields: BTreeSet<&'a str>,
}

impl<'a> AllowedModel<'a> {
    fn new(record: &'a PermissionRecord) -> Self {
        // A forced field needs no explicit column grant; the policy itself
        // supplies its value, so it never counts as caller-visible.
        let fields = record
            .def
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !record.def.set.contains_key(*c))
            .collect();
        Self { record, fields }
    }

    fn denies_verb(&self, verb: &str) -> bool {
        match &self.record.def.ops {
            Some(ops) => !ops.contains(verb),
            None => false,
        }
    }
}

fn allowed_by_type<'a>(
    records: &'a [PermissionRecord],
    perm_type: PermType,
) -> BTreeMap<&'a str, AllowedModel<'a>> {
    records
        .iter()
        .filter(|r| r.perm_type == perm_type)
        .map(|r| (r.model.as_str(), AllowedModel::new(r)))
        .collect()
}

const READ_VERBS: [RootOp; 6] = [
    RootOp::FindMany,
    RootOp::FindUnique,
    RootOp::FindFirst,
    RootOp::Aggregate,
    RootOp::Count,
    RootOp::Subscription,
];

/// Computes the deny-lists for one role.
pub fn role_schema_filters(
    models: &ModelCatalog,
    inputs: &InputCatalog,
    records: &[PermissionRecord],
    role: &str,
    annotations: &[RootFieldAnnotation],
) -> RoleSchemaFilters {
    let mut filters = RoleSchemaFilters::default();

    let read = allowed_by_type(records, PermType::Read);
    let create = allowed_by_type(records, PermType::Create);
    let update = allowed_by_type(records, PermType::Update);
    let delete = allowed_by_type(records, PermType::Delete);

    let granted_models: BTreeSet<&str> = records.iter().map(|r| r.model.as_str()).collect();

    for model in models.models() {
        let name = model.name.as_str();
        let fully_denied = !granted_models.contains(name);

        if fully_denied {
            // The type itself goes away; these root fields and inputs do not
            // die with it and must be removed explicitly.
            filters.types.insert(name.to_string());
            for op in [
                RootOp::CreateMany,
                RootOp::DeleteMany,
                RootOp::UpdateMany,
                RootOp::Aggregate,
                RootOp::Count,
            ] {
                filters.root_fields.insert(op.field_name(name));
            }
            filters.inputs.extend(inputs.names_for_model(
                &[
                    InputKind::Where,
                    InputKind::WhereUnique,
                    InputKind::OrderBy,
                    InputKind::ListRelationFilter,
                    InputKind::CreateNestedMany,
                    InputKind::CreateNestedOne,
                    InputKind::UpdateManyNested,
                    InputKind::UpdateManyWithWhere,
                    InputKind::UpdateOneNested,
                    InputKind::UpdateOneRequiredNested,
                ],
                name,
            ));
        }

        if !read.contains_key(name) {
            filters.types.insert(format!("{name}Subscription"));
            if !fully_denied {
                for op in READ_VERBS {
                    if op == RootOp::Subscription {
                        filters
                            .root_subscription_fields
                            .insert(op.field_name(name));
                    } else {
                        filters.root_fields.insert(op.field_name(name));
                    }
                }
            }
        }
        if !create.contains_key(name) {
            if !fully_denied {
                for op in [RootOp::CreateMany, RootOp::UpsertOne, RootOp::CreateOne] {
                    filters.root_fields.insert(op.field_name(name));
                }
            }
            filters.inputs.extend(inputs.names_for_model(
                &[
                    InputKind::CreateWithout,
                    InputKind::UncheckedCreateWithout,
                    InputKind::CreateMany,
                    InputKind::CreateOrConnectWithout,
                    InputKind::UpsertWithWhere,
                    InputKind::UpsertWithout,
                ],
                name,
            ));
        }
        if !update.contains_key(name) {
            if !fully_denied {
                for op in [RootOp::UpdateOne, RootOp::UpsertOne, RootOp::UpdateMany] {
                    filters.root_fields.insert(op.field_name(name));
                }
            }
            filters.inputs.extend(inputs.names_for_model(
                &[
                    InputKind::UncheckedUpdateWithout,
                    InputKind::UpdateWithWhere,
                    InputKind::UpdateManyWithWhere,
                    InputKind::UpsertWithWhere,
                    InputKind::UpsertWithout,
                ],
                name,
            ));
        }
        if !delete.contains_key(name) {
            if !fully_denied {
                for op in [RootOp::DeleteOne, RootOp::DeleteMany] {
                    filters.root_fields.insert(op.field_name(name));
                }
            }
            // Nested write envelopes keep their delete verbs otherwise.
            let nested = inputs.names_for_model(
                &[InputKind::UpdateManyNested, InputKind::UpdateOneNested],
                name,
            );
            if !nested.is_empty() {
                filters.input_fields.push(InputFieldsFilter {
                    inputs: nested,
                    fields: ["delete", "deleteMany"].iter().map(|s| s.to_string()).collect(),
                });
            }
        }

        if let Some(allowed) = read.get(name) {
            let denied_fields: BTreeSet<String> = model
                .fields
                .iter()
                .filter(|f| !allowed.fields.contains(f.name.as_str()))
                .map(|f| f.name.clone())
                .collect();

            for op in READ_VERBS {
                if op == RootOp::Subscription {
                    if allowed.denies_verb("subscription") {
                        filters
                            .root_subscription_fields
                            .insert(op.field_name(name));
                    }
                } else if allowed.denies_verb(op.verb()) {
                    filters.root_fields.insert(op.field_name(name));
                }
            }

            if !denied_fields.is_empty() {
                filters.object_fields.push(ModelFieldsFilter {
                    model: name.to_string(),
                    fields: denied_fields.clone(),
                });
                filters.input_fields.push(InputFieldsFilter {
                    inputs: inputs.names_for_model(
                        &[InputKind::Where, InputKind::OrderBy, InputKind::ScalarWhere],
                        name,
                    ),
                    fields: denied_fields.clone(),
                });
                filters.output_fields.push(OutputFieldsFilter {
                    outputs: [
                        "CountAggregateOutputType",
                        "AvgAggregateOutputType",
                        "SumAggregateOutputType",
                        "MinAggregateOutputType",
                        "MaxAggregateOutputType",
                    ]
                    .iter()
                    .map(|suffix| format!("{name}{suffix}"))
                    .collect(),
                    fields: denied_fields,
                });
            }
        }

        if let Some(allowed) = create.get(name) {
            project_write_fields(
                &mut filters,
                inputs,
                model,
                allowed,
                &[InputKind::CreateWithout, InputKind::UncheckedCreateWithout],
                InputKind::Create,
            );
            if allowed.denies_verb("createOne") {
                filters.root_fields.insert(RootOp::CreateOne.field_name(name));
            }
            if allowed.denies_verb("createMany") {
                filters.root_fields.insert(RootOp::CreateMany.field_name(name));
                filters.input_fields.push(InputFieldsFilter {
                    inputs: inputs.names_for_model(
                        &[InputKind::CreateMany, InputKind::UpdateManyNested],
                        name,
                    ),
                    fields: std::iter::once("createMany".to_string()).collect(),
                });
            }
            project_relation_ops(
                &mut filters,
                models,
                inputs,
                model,
                allowed,
                &[InputKind::CreateNestedMany, InputKind::CreateNestedOne],
            );
        }

        if let Some(allowed) = update.get(name) {
            project_write_fields(
                &mut filters,
                inputs,
                model,
                allowed,
                &[
                    InputKind::UpdateWithout,
                    InputKind::UncheckedUpdateWithout,
                    InputKind::UpdateOneRequiredNested,
                ],
                InputKind::Update,
            );
            for (verb, op) in [
                ("updateOne", RootOp::UpdateOne),
                ("upsertOne", RootOp::UpsertOne),
            ] {
                if allowed.denies_verb(verb) {
                    filters.root_fields.insert(op.field_name(name));
                }
            }
            if allowed.denies_verb("updateMany") {
                filters.root_fields.insert(RootOp::UpdateMany.field_name(name));
                filters.input_fields.push(InputFieldsFilter {
                    inputs: inputs.names_for_model(&[InputKind::UpdateManyNested], name),
                    fields: std::iter::once("updateMany".to_string()).collect(),
                });
            }
            project_relation_ops(
                &mut filters,
                models,
                inputs,
                model,
                allowed,
                &[
                    InputKind::UpdateManyNested,
                    InputKind::UpdateOneNested,
                    InputKind::UpdateOneRequiredNested,
                ],
            );
        }

        if let Some(allowed) = delete.get(name) {
            for (verb, op) in [
                ("deleteOne", RootOp::DeleteOne),
                ("deleteMany", RootOp::DeleteMany),
            ] {
                if allowed.denies_verb(verb) {
                    filters.root_fields.insert(op.field_name(name));
                }
            }
            if allowed.denies_verb("deleteMany") {
                filters.input_fields.push(InputFieldsFilter {
                    inputs: inputs.names_for_model(&[InputKind::UpdateManyNested], name),
                    fields: std::iter::once("deleteMany".to_string()).collect(),
                });
            }
        }
    }

    for annotation in annotations {
        if annotation.subscription {
            let visible = match &annotation.allow_roles {
                None => true,
                Some(allow) => allow.iter().any(|r| r == role),
            };
            if !visible {
                filters
                    .root_subscription_fields
                    .insert(annotation.field.clone());
            }
        } else {
            let unrestricted =
                annotation.allow_roles.is_none() && annotation.prevent_roles.is_none();
            let not_prevented = annotation
                .prevent_roles
                .as_ref()
                .is_some_and(|p| !p.iter().any(|r| r == role));
            let allowed = annotation
                .allow_roles
                .as_ref()
                .is_some_and(|a| a.iter().any(|r| r == role));
            if !(unrestricted || not_prevented || allowed) {
                filters.root_fields.insert(annotation.field.clone());
            }
        }
    }

    filters
}

/// Field-level deny entries for write input shapes.
fn project_write_fields(
    filters: &mut RoleSchemaFilters,
    inputs: &InputCatalog,
    model: &crate::catalog::ModelDef,
    allowed: &AllowedModel<'_>,
    nested_kinds: &[InputKind],
    top_kind: InputKind,
) {
    let denied_fields: BTreeSet<String> = model
        .fields
        .iter()
        .filter(|f| !allowed.fields.contains(f.name.as_str()))
        .map(|f| f.name.clone())
        .collect();
    if denied_fields.is_empty() {
        return;
    }
    let mut shapes = inputs.names_for_model(nested_kinds, &model.name);
    shapes.extend(inputs.names_for_model(&[top_kind], &model.name));
    filters.input_fields.push(InputFieldsFilter {
        inputs: shapes,
        fields: denied_fields,
    });
}

/// Relation-verb narrowing from `objectFieldsOps`: verbs not explicitly
/// allowed for a relation field are removed from the nested input shapes the
/// parent references for that relation.
fn project_relation_ops(
    filters: &mut RoleSchemaFilters,
    models: &ModelCatalog,
    inputs: &InputCatalog,
    model: &crate::catalog::ModelDef,
    allowed: &AllowedModel<'_>,
    kinds: &[InputKind],
) {
    for field in model.relation_fields() {
        let granted = allowed
            .record
            .def
            .object_fields_ops
            .get(&field.name)
            .map(|ops| &ops.allowed);
        let denied: BTreeSet<String> = RELATION_FIELD_OPS
            .iter()
            .filter(|verb| !granted.is_some_and(|g| g.contains(**verb)))
            .map(|verb| verb.to_string())
            .collect();
        if denied.is_empty() {
            continue;
        }
        let Some(related) = models.relation_model(&model.name, &field.name) else {
            continue;
        };
        let shapes = inputs.names_via_parent(kinds, related, &model.name);
        if !shapes.is_empty() {
            filters.input_fields.push(InputFieldsFilter {
                inputs: shapes,
                fields: denied,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, ModelDef};
    use crate::policy::{ObjectFieldOps, PermissionDefinition, SetValue};
    use serde_json::json;

    fn catalog() -> ModelCatalog {
        ModelCatalog::new(vec![
            ModelDef::new(
                "Post",
                vec![
                    FieldDef::scalar("id", "String"),
                    FieldDef::scalar("title", "String"),
                    FieldDef::scalar("body", "String"),
                    FieldDef::relation("author", "User", false),
                ],
            ),
            ModelDef::new(
                "Secret",
                vec![FieldDef::scalar("id", "String")],
            ),
            ModelDef::new(
                "User",
                vec![
                    FieldDef::scalar("id", "String"),
                    FieldDef::relation("posts", "Post", true),
                ],
            ),
        ])
    }

    fn read_perm(model: &str, columns: &[&str]) -> PermissionRecord {
        let def = PermissionDefinition {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        };
        PermissionRecord::new("EDITOR", model, PermType::Read, def)
    }

    fn project(records: &[PermissionRecord]) -> RoleSchemaFilters {
        let models = catalog();
        let inputs = InputCatalog::derive(&models);
        role_schema_filters(&models, &inputs, records, "EDITOR", &[])
    }

    #[test]
    fn test_unpermitted_model_fully_hidden() {
        let filters = project(&[read_perm("Post", &["id", "title"])]);
        assert!(filters.types.contains("Secret"));
        assert!(filters.types.contains("User"));
        for op in ["createMany", "deleteMany", "updateMany", "aggregate", "count"] {
            assert!(filters.root_fields.contains(&format!("{op}Secret")));
        }
        assert!(filters.inputs.contains("SecretWhereInput"));
    }

    #[test]
    fn test_denied_columns_projected_out() {
        let filters = project(&[read_perm("Post", &["id", "title"])]);
        let entry = filters
            .object_fields
            .iter()
            .find(|f| f.model == "Post")
            .unwrap();
        assert!(entry.fields.contains("body"));
        assert!(entry.fields.contains("author"));
        assert!(!entry.fields.contains("title"));
        // where/orderBy inputs lose the same fields
        assert!(filters.input_fields.iter().any(|f| {
            f.inputs.iter().any(|i| i == "PostWhereInput") && f.fields.contains("body")
        }));
        // aggregate outputs too
        assert!(filters.output_fields.iter().any(|f| {
            f.outputs.iter().any(|o| o == "PostCountAggregateOutputType")
                && f.fields.contains("body")
        }));
    }

    #[test]
    fn test_missing_perm_types_deny_root_fields() {
        let filters = project(&[read_perm("Post", &["id", "title"])]);
        // Post is granted READ only
        for field in ["createOnePost", "updateOnePost", "upsertOnePost", "deleteOnePost"] {
            assert!(filters.root_fields.contains(field), "missing {field}");
        }
        assert!(!filters.root_fields.contains("findManyPost"));
    }

    #[test]
    fn test_ops_narrowing_denies_specific_verbs() {
        let mut record = read_perm("Post", &["id", "title", "body", "author"]);
        record.def.ops = Some(["findUnique", "findFirst"].iter().map(|s| s.to_string()).collect());
        let filters = project(&[record]);
        assert!(filters.root_fields.contains("findManyPost"));
        assert!(filters.root_fields.contains("aggregatePost"));
        assert!(filters.root_fields.contains("countPost"));
        assert!(!filters.root_fields.contains("findUniquePost"));
        assert!(filters.root_subscription_fields.contains("subscribePost"));
    }

    #[test]
    fn test_set_columns_excluded_from_visibility() {
        let mut record = PermissionRecord::new(
            "EDITOR",
            "Post",
            PermType::Create,
            PermissionDefinition {
                columns: ["id", "title", "body"].iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        );
        record
            .def
            .set
            .insert("body".into(), SetValue::parse(&json!("ctx-fn-template")));
        // body is forced by the policy, so it is denied as a caller-visible
        // input field even though it appears in columns.
        let filters = project(&[record]);
        assert!(filters.input_fields.iter().any(|f| {
            f.inputs.iter().any(|i| i == "PostCreateInput") && f.fields.contains("body")
        }));
    }

    #[test]
    fn test_relation_verb_narrowing() {
        let mut record = PermissionRecord::new(
            "EDITOR",
            "User",
            PermType::Update,
            PermissionDefinition {
                columns: std::iter::once("id".to_string()).collect(),
                ..Default::default()
            },
        );
        record.def.object_fields_ops.insert(
            "posts".into(),
            ObjectFieldOps {
                model: "Post".into(),
                allowed: std::iter::once("connect".to_string()).collect(),
            },
        );
        let filters = project(&[record]);
        // several deny entries can reference the same input shape; the
        // narrowing holds over their union
        let denied: BTreeSet<&str> = filters
            .input_fields
            .iter()
            .filter(|f| f.inputs.iter().any(|i| i == "PostUpdateManyWithoutUserInput"))
            .flat_map(|f| f.fields.iter().map(String::as_str))
            .collect();
        assert!(denied.contains("disconnect"));
        assert!(denied.contains("set"));
        assert!(denied.contains("connectOrCreate"));
        assert!(!denied.contains("connect"));
    }

    #[test]
    fn test_annotations_respected() {
        let models = catalog();
        let inputs = InputCatalog::derive(&models);
        let annotations = vec![
            RootFieldAnnotation {
                field: "findManyModel".into(),
                subscription: false,
                allow_roles: Some(vec!["ADMIN".into()]),
                prevent_roles: None,
            },
            RootFieldAnnotation {
                field: "health".into(),
                subscription: false,
                allow_roles: None,
                prevent_roles: None,
            },
        ];
        let filters = role_schema_filters(&models, &inputs, &[], "EDITOR", &annotations);
        assert!(filters.root_fields.contains("findManyModel"));
        assert!(!filters.root_fields.contains("health"));
    }

    #[test]
    fn test_projection_is_idempotent() {
        let records = vec![read_perm("Post", &["id", "title"])];
        assert_eq!(project(&records), project(&records));
    }
}
