//! Declarative model catalog and derived input-shape catalog.
//!
//! The model catalog mirrors the schema-introspection source: models, fields,
//! scalar/object/enum kinds, and list-vs-scalar relation cardinality. It is
//! process-wide read-only state, initialized once at startup and passed
//! explicitly into the walker and the projection engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The kind of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Scalar,
    Object,
    Enum,
}

/// One field of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Scalar/enum type name, or the related model name for object fields.
    pub type_name: String,
    pub is_list: bool,
}

impl FieldDef {
    pub fn scalar(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
            type_name: type_name.into(),
            is_list: false,
        }
    }

    pub fn enumeration(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Enum,
            type_name: type_name.into(),
            is_list: false,
        }
    }

    pub fn relation(name: impl Into<String>, model: impl Into<String>, is_list: bool) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Object,
            type_name: model.into(),
            is_list,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.kind == FieldKind::Object
    }
}

/// One model definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_relation())
    }
}

/// The declarative model catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelDef>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDef>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.name.clone(), m)).collect(),
        }
    }

    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }

    /// Models in name order, so every derivation over the catalog is
    /// deterministic.
    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values()
    }

    /// Resolves the related model of a relation field, if any.
    pub fn relation_model(&self, model: &str, field: &str) -> Option<&str> {
        let def = self.model(model)?.field(field)?;
        def.is_relation().then_some(def.type_name.as_str())
    }
}

/// Kinds of synthesized input types.
///
/// Nested create/update input shapes are modeled as first-class entities with
/// a kind, an owning model, and an optional relation reference, so deny-lists
/// are derived structurally instead of by string-prefix matching of generated
/// type names. The concrete names are still rendered compositionally for the
/// schema-transform collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Where,
    WhereUnique,
    OrderBy,
    ScalarWhere,
    ListRelationFilter,
    Create,
    Update,
    CreateMany,
    CreateWithout,
    UncheckedCreateWithout,
    UpdateWithout,
    UncheckedUpdateWithout,
    CreateOrConnectWithout,
    UpsertWithout,
    UpsertWithWhere,
    UpdateWithWhere,
    UpdateManyWithWhere,
    CreateNestedMany,
    CreateNestedOne,
    UpdateManyNested,
    UpdateOneNested,
    UpdateOneRequiredNested,
}

/// One synthesized input type.
#[derive(Debug, Clone, PartialEq)]
pub struct InputShape {
    pub name: String,
    pub kind: InputKind,
    /// The model whose rows the input describes.
    pub model: String,
    /// The relation reference the shape was synthesized through: the
    /// capitalized field name for `...Without<Field>` shapes on the owning
    /// model, or the parent model name for nested shapes on the related one.
    pub via: Option<String>,
}

/// All synthesized input shapes derived from a model catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputCatalog {
    shapes: Vec<InputShape>,
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn render(kind: InputKind, model: &str, via: Option<&str>) -> String {
    let via = via.unwrap_or_default();
    match kind {
        InputKind::Where => format!("{model}WhereInput"),
        InputKind::WhereUnique => format!("{model}WhereUniqueInput"),
        InputKind::OrderBy => format!("{model}OrderByInput"),
        InputKind::ScalarWhere => format!("{model}ScalarWhereInput"),
        InputKind::ListRelationFilter => format!("{model}ListRelationFilter"),
        InputKind::Create => format!("{model}CreateInput"),
        InputKind::Update => format!("{model}UpdateInput"),
        InputKind::CreateMany => format!("{model}CreateManyInput"),
        InputKind::CreateWithout => format!("{model}CreateWithout{via}Input"),
        InputKind::UncheckedCreateWithout => format!("{model}UncheckedCreateWithout{via}Input"),
        InputKind::UpdateWithout => format!("{model}UpdateWithout{via}Input"),
        InputKind::UncheckedUpdateWithout => format!("{model}UncheckedUpdateWithout{via}Input"),
        InputKind::CreateOrConnectWithout => format!("{model}CreateOrConnectWithout{via}Input"),
        InputKind::UpsertWithout => format!("{model}UpsertWithout{via}Input"),
        InputKind::UpsertWithWhere => {
            format!("{model}UpsertWithWhereUniqueWithout{via}Input")
        }
        InputKind::UpdateWithWhere => {
            format!("{model}UpdateWithWhereUniqueWithout{via}Input")
        }
        InputKind::UpdateManyWithWhere => {
            format!("{model}UpdateManyWithWhereWithout{via}Input")
        }
        InputKind::CreateNestedMany => format!("{model}CreateNestedManyWithout{via}Input"),
        InputKind::CreateNestedOne => format!("{model}CreateNestedOneWithout{via}Input"),
        InputKind::UpdateManyNested => format!("{model}UpdateManyWithout{via}Input"),
        InputKind::UpdateOneNested => format!("{model}UpdateOneWithout{via}Input"),
        InputKind::UpdateOneRequiredNested => {
            format!("{model}UpdateOneRequiredWithout{via}Input")
        }
    }
}

impl InputCatalog {
    /// Derives every input shape the schema generator would synthesize for
    /// the given model catalog.
    pub fn derive(catalog: &ModelCatalog) -> InputCatalog {
        let mut shapes = Vec::new();
        let mut push = |kind: InputKind, model: &str, via: Option<&str>| {
            shapes.push(InputShape {
                name: render(kind, model, via),
                kind,
                model: model.to_string(),
                via: via.map(str::to_string),
            });
        };

        for model in catalog.models() {
            for kind in [
                InputKind::Where,
                InputKind::WhereUnique,
                InputKind::OrderBy,
                InputKind::ScalarWhere,
                InputKind::ListRelationFilter,
                InputKind::Create,
                InputKind::Update,
                InputKind::CreateMany,
            ] {
                push(kind, &model.name, None);
            }

            for field in model.relation_fields() {
                let via = capitalize(&field.name);
                for kind in [
                    InputKind::CreateWithout,
                    InputKind::UncheckedCreateWithout,
                    InputKind::UpdateWithout,
                    InputKind::UncheckedUpdateWithout,
                    InputKind::CreateOrConnectWithout,
                    InputKind::UpsertWithout,
                    InputKind::UpsertWithWhere,
                    InputKind::UpdateWithWhere,
                    InputKind::UpdateManyWithWhere,
                ] {
                    push(kind, &model.name, Some(&via));
                }

                // Shapes the parent's write inputs reference for this field,
                // owned by the related model.
                let related = &field.type_name;
                if field.is_list {
                    push(InputKind::CreateNestedMany, related, Some(&model.name));
                    push(InputKind::UpdateManyNested, related, Some(&model.name));
                } else {
                    push(InputKind::CreateNestedOne, related, Some(&model.name));
                    push(InputKind::UpdateOneNested, related, Some(&model.name));
                    push(
                        InputKind::UpdateOneRequiredNested,
                        related,
                        Some(&model.name),
                    );
                }
            }
        }
        InputCatalog { shapes }
    }

    pub fn shapes(&self) -> &[InputShape] {
        &self.shapes
    }

    /// Names of shapes of the given kinds owned by `model`, regardless of the
    /// relation reference.
    pub fn names_for_model(&self, kinds: &[InputKind], model: &str) -> Vec<String> {
        self.shapes
            .iter()
            .filter(|s| s.model == model && kinds.contains(&s.kind))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Names of nested shapes owned by `model` and synthesized through the
    /// given parent model.
    pub fn names_via_parent(&self, kinds: &[InputKind], model: &str, parent: &str) -> Vec<String> {
        self.shapes
            .iter()
            .filter(|s| {
                s.model == model && s.via.as_deref() == Some(parent) && kinds.contains(&s.kind)
            })
            .map(|s| s.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        ModelCatalog::new(vec![
            ModelDef::new(
                "User",
                vec![
                    FieldDef::scalar("id", "String"),
                    FieldDef::scalar("email", "String"),
                    FieldDef::relation("posts", "Post", true),
                ],
            ),
            ModelDef::new(
                "Post",
                vec![
                    FieldDef::scalar("id", "String"),
                    FieldDef::scalar("title", "String"),
                    FieldDef::relation("author", "User", false),
                ],
            ),
        ])
    }

    #[test]
    fn test_relation_model_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.relation_model("User", "posts"), Some("Post"));
        assert_eq!(catalog.relation_model("Post", "author"), Some("User"));
        assert_eq!(catalog.relation_model("Post", "title"), None);
        assert_eq!(catalog.relation_model("Post", "missing"), None);
    }

    #[test]
    fn test_input_catalog_rendering() {
        let inputs = InputCatalog::derive(&catalog());
        let names: Vec<&str> = inputs.shapes().iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"PostWhereInput"));
        assert!(names.contains(&"UserCreateWithoutPostsInput"));
        assert!(names.contains(&"PostCreateNestedManyWithoutUserInput"));
        assert!(names.contains(&"UserCreateNestedOneWithoutPostInput"));
        assert!(names.contains(&"UserUpdateOneRequiredWithoutPostInput"));
    }

    #[test]
    fn test_names_via_parent_is_structural() {
        let inputs = InputCatalog::derive(&catalog());
        let nested = inputs.names_via_parent(
            &[InputKind::CreateNestedMany, InputKind::CreateNestedOne],
            "Post",
            "User",
        );
        assert_eq!(nested, vec!["PostCreateNestedManyWithoutUserInput"]);
        assert!(inputs
            .names_via_parent(&[InputKind::CreateNestedMany], "Post", "Comment")
            .is_empty());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        assert_eq!(InputCatalog::derive(&catalog()), InputCatalog::derive(&catalog()));
    }
}
