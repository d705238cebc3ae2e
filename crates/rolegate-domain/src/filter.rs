//! Filter expression grammar and condition evaluation.
//!
//! Incoming `where` filters and policy check predicates arrive as loosely
//! shaped JSON. They are parsed exactly once at the boundary into the tagged
//! [`FilterExpr`] form; everything downstream matches exhaustively over it
//! instead of re-inspecting key presence.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};

/// Comparison operators supported in filter leaves.
///
/// Unknown operator names fail closed at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    Contains(Value),
    StartsWith(Value),
    EndsWith(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Negation: the inner constraint is evaluated against the candidate and
    /// the result inverted.
    Not(Box<FieldFilter>),
}

/// The constraint attached to one field of a filter object: either a set of
/// operator leaves or a nested relation filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Operator leaves, e.g. `{ equals: 3 }`. A leaf carrying several
    /// operators is evaluated conjunctively: every operator must hold.
    Conditions(Vec<Condition>),
    /// A nested object constraint on a relation field.
    Relation(Box<FilterExpr>),
}

/// One clause of a filter object. All clauses of a [`FilterExpr`] are
/// implicitly conjoined.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    /// `AND: [...]` - every sub-expression must hold.
    And(Vec<FilterExpr>),
    /// `OR: [...]` - at least one sub-expression must hold; an empty list
    /// never holds.
    Or(Vec<FilterExpr>),
    /// `NOT: {...}` - the sub-expression must not hold.
    Not(Box<FilterExpr>),
    /// A field constraint.
    Field(String, FieldFilter),
}

/// A parsed filter or check predicate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterExpr {
    pub clauses: Vec<FilterClause>,
}

const OPERATOR_KEYS: &[&str] = &[
    "equals",
    "contains",
    "startsWith",
    "endsWith",
    "gt",
    "gte",
    "lt",
    "lte",
    "in",
    "notIn",
    "not",
];

fn is_operator_key(key: &str) -> bool {
    OPERATOR_KEYS.contains(&key)
}

impl FilterExpr {
    /// Parses a JSON filter object into the tagged form.
    pub fn parse(value: &Value) -> DomainResult<FilterExpr> {
        let obj = value
            .as_object()
            .ok_or_else(|| DomainError::invalid_payload("filter must be an object"))?;
        let mut clauses = Vec::with_capacity(obj.len());
        for (key, sub) in obj {
            match key.as_str() {
                "AND" => clauses.push(FilterClause::And(parse_expr_list(sub)?)),
                "OR" => clauses.push(FilterClause::Or(parse_expr_list(sub)?)),
                "NOT" => {
                    // Prisma accepts both a single object and an array here;
                    // an array negates each element independently.
                    for expr in parse_expr_list(sub)? {
                        clauses.push(FilterClause::Not(Box::new(expr)));
                    }
                }
                _ => clauses.push(FilterClause::Field(key.clone(), FieldFilter::parse(sub)?)),
            }
        }
        Ok(FilterExpr { clauses })
    }

    /// Renders the expression back into the JSON wire shape understood by the
    /// persistence collaborator.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        let mut and = Vec::new();
        let mut or = Vec::new();
        let mut not = Vec::new();
        for clause in &self.clauses {
            match clause {
                FilterClause::And(subs) => and.extend(subs.iter().map(FilterExpr::to_value)),
                FilterClause::Or(subs) => or.extend(subs.iter().map(FilterExpr::to_value)),
                FilterClause::Not(sub) => not.push(sub.to_value()),
                FilterClause::Field(name, filter) => {
                    obj.insert(name.clone(), filter.to_value());
                }
            }
        }
        if !and.is_empty() {
            obj.insert("AND".into(), Value::Array(and));
        }
        if !or.is_empty() {
            obj.insert("OR".into(), Value::Array(or));
        }
        match not.len() {
            0 => {}
            1 => {
                obj.insert("NOT".into(), not.into_iter().next().unwrap_or(Value::Null));
            }
            _ => {
                obj.insert("NOT".into(), Value::Array(not));
            }
        }
        Value::Object(obj)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluates the expression against a flat row, as the in-memory
    /// persistence backend does for `count`/`findMany`.
    ///
    /// This is strict row matching: a missing field is treated as `null`,
    /// unlike the permissive walk in [`crate::engine`] over write payloads.
    pub fn matches_row(&self, row: &Map<String, Value>) -> bool {
        self.clauses.iter().all(|clause| match clause {
            FilterClause::And(subs) => subs.iter().all(|s| s.matches_row(row)),
            FilterClause::Or(subs) => subs.iter().any(|s| s.matches_row(row)),
            FilterClause::Not(sub) => !sub.matches_row(row),
            FilterClause::Field(name, filter) => {
                let candidate = row.get(name).unwrap_or(&Value::Null);
                filter.matches_value(candidate)
            }
        })
    }
}

fn parse_expr_list(value: &Value) -> DomainResult<Vec<FilterExpr>> {
    match value {
        Value::Array(items) => items.iter().map(FilterExpr::parse).collect(),
        Value::Object(_) => Ok(vec![FilterExpr::parse(value)?]),
        _ => Err(DomainError::invalid_payload(
            "boolean combinator expects an object or an array of objects",
        )),
    }
}

impl FieldFilter {
    /// Parses a field constraint. An object whose keys are all operator names
    /// becomes a condition leaf; an object with no operator keys becomes a
    /// nested relation filter; a bare scalar is shorthand for `equals`.
    pub fn parse(value: &Value) -> DomainResult<FieldFilter> {
        match value {
            Value::Object(obj) if !obj.is_empty() => {
                let operators = obj.keys().filter(|k| is_operator_key(k)).count();
                if operators == obj.len() {
                    let mut conditions = Vec::with_capacity(obj.len());
                    for (op, operand) in obj {
                        conditions.push(Condition::parse(op, operand)?);
                    }
                    Ok(FieldFilter::Conditions(conditions))
                } else if operators == 0 {
                    Ok(FieldFilter::Relation(Box::new(FilterExpr::parse(value)?)))
                } else {
                    Err(DomainError::invalid_payload(
                        "filter leaf mixes operator and field keys",
                    ))
                }
            }
            Value::Object(_) => Ok(FieldFilter::Conditions(Vec::new())),
            other => Ok(FieldFilter::Conditions(vec![Condition::Equals(
                other.clone(),
            )])),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            FieldFilter::Conditions(conditions) => {
                let mut obj = Map::new();
                for condition in conditions {
                    let (op, operand) = condition.to_entry();
                    obj.insert(op.to_string(), operand);
                }
                Value::Object(obj)
            }
            FieldFilter::Relation(expr) => expr.to_value(),
        }
    }

    /// Evaluates this constraint against a candidate value.
    pub fn matches_value(&self, candidate: &Value) -> bool {
        match self {
            FieldFilter::Conditions(conditions) => {
                conditions.iter().all(|c| c.matches(candidate))
            }
            FieldFilter::Relation(expr) => match candidate {
                Value::Object(inner) => expr.matches_row(inner),
                _ => false,
            },
        }
    }
}

impl Condition {
    /// Parses one operator leaf. Unknown operators are rejected so they can
    /// never silently widen a policy.
    pub fn parse(op: &str, operand: &Value) -> DomainResult<Condition> {
        Ok(match op {
            "equals" => Condition::Equals(operand.clone()),
            "contains" => Condition::Contains(operand.clone()),
            "startsWith" => Condition::StartsWith(operand.clone()),
            "endsWith" => Condition::EndsWith(operand.clone()),
            "gt" => Condition::Gt(operand.clone()),
            "gte" => Condition::Gte(operand.clone()),
            "lt" => Condition::Lt(operand.clone()),
            "lte" => Condition::Lte(operand.clone()),
            "in" => Condition::In(operand_list(operand)?),
            "notIn" => Condition::NotIn(operand_list(operand)?),
            "not" => Condition::Not(Box::new(FieldFilter::parse(operand)?)),
            other => {
                return Err(DomainError::invalid_payload(format!(
                    "unknown filter operator '{other}'"
                )))
            }
        })
    }

    fn to_entry(&self) -> (&'static str, Value) {
        match self {
            Condition::Equals(v) => ("equals", v.clone()),
            Condition::Contains(v) => ("contains", v.clone()),
            Condition::StartsWith(v) => ("startsWith", v.clone()),
            Condition::EndsWith(v) => ("endsWith", v.clone()),
            Condition::Gt(v) => ("gt", v.clone()),
            Condition::Gte(v) => ("gte", v.clone()),
            Condition::Lt(v) => ("lt", v.clone()),
            Condition::Lte(v) => ("lte", v.clone()),
            Condition::In(vs) => ("in", Value::Array(vs.clone())),
            Condition::NotIn(vs) => ("notIn", Value::Array(vs.clone())),
            Condition::Not(inner) => ("not", inner.to_value()),
        }
    }

    /// Evaluates the condition against a candidate value. The candidate is
    /// the haystack for string containment operators.
    pub fn matches(&self, candidate: &Value) -> bool {
        match self {
            Condition::Equals(operand) => candidate == operand,
            Condition::Contains(operand) => {
                string_pair(candidate, operand).is_some_and(|(c, o)| c.contains(o))
            }
            Condition::StartsWith(operand) => {
                string_pair(candidate, operand).is_some_and(|(c, o)| c.starts_with(o))
            }
            Condition::EndsWith(operand) => {
                string_pair(candidate, operand).is_some_and(|(c, o)| c.ends_with(o))
            }
            Condition::Gt(operand) => {
                compare_values(candidate, operand) == Some(Ordering::Greater)
            }
            Condition::Gte(operand) => matches!(
                compare_values(candidate, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::Lt(operand) => compare_values(candidate, operand) == Some(Ordering::Less),
            Condition::Lte(operand) => matches!(
                compare_values(candidate, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::In(operands) => operands.contains(candidate),
            Condition::NotIn(operands) => !operands.contains(candidate),
            Condition::Not(inner) => !inner.matches_value(candidate),
        }
    }
}

fn operand_list(value: &Value) -> DomainResult<Vec<Value>> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| DomainError::invalid_payload("'in'/'notIn' operand must be an array"))
}

fn string_pair<'a>(candidate: &'a Value, operand: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((candidate.as_str()?, operand.as_str()?))
}

/// Ordered comparison over JSON scalars: numbers compare numerically, strings
/// lexicographically; mixed or unordered kinds do not compare.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

/// A unique-row selector: field name to expected value, e.g. `{ id: 3 }`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selector(pub BTreeMap<String, Value>);

impl Selector {
    pub fn parse(value: &Value) -> DomainResult<Selector> {
        let obj = value
            .as_object()
            .ok_or_else(|| DomainError::invalid_payload("unique selector must be an object"))?;
        Ok(Selector(
            obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ))
    }

    /// Converts the unique selector into an equality filter, so it can be
    /// merged with a check predicate and handed to `count`.
    pub fn to_filter(&self) -> FilterExpr {
        FilterExpr {
            clauses: self
                .0
                .iter()
                .map(|(field, value)| {
                    FilterClause::Field(
                        field.clone(),
                        FieldFilter::Conditions(vec![Condition::Equals(value.clone())]),
                    )
                })
                .collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Builds an `OR` filter over a batch of unique selectors.
pub fn selectors_to_filter(selectors: &[Selector]) -> FilterExpr {
    FilterExpr {
        clauses: vec![FilterClause::Or(
            selectors.iter().map(Selector::to_filter).collect(),
        )],
    }
}

/// Conjoins a policy check predicate into a caller-supplied filter.
///
/// The check is appended to the filter's existing `AND` clause (created if
/// absent); the caller's combinators are never discarded and the check is
/// never mutated. Double-merging the same predicate is not deduplicated.
pub fn merge_check_with_where(where_filter: Option<FilterExpr>, check: &FilterExpr) -> FilterExpr {
    let mut merged = match where_filter {
        Some(filter) => filter,
        None => return check.clone(),
    };
    for clause in &mut merged.clauses {
        if let FilterClause::And(subs) = clause {
            subs.push(check.clone());
            return merged;
        }
    }
    merged.clauses.push(FilterClause::And(vec![check.clone()]));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> FilterExpr {
        FilterExpr::parse(&value).unwrap()
    }

    #[test]
    fn test_parse_operator_leaf() {
        let expr = parse(json!({ "name": { "equals": "alice" } }));
        assert_eq!(expr.clauses.len(), 1);
        match &expr.clauses[0] {
            FilterClause::Field(name, FieldFilter::Conditions(conds)) => {
                assert_eq!(name, "name");
                assert_eq!(conds, &vec![Condition::Equals(json!("alice"))]);
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn test_parse_nested_relation() {
        let expr = parse(json!({ "author": { "id": { "equals": 1 } } }));
        match &expr.clauses[0] {
            FilterClause::Field(_, FieldFilter::Relation(_)) => {}
            other => panic!("expected relation filter, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = FilterExpr::parse(&json!({ "name": { "matchesRegex": ".*" } }));
        // An object with one unknown key parses as a relation filter on a
        // scalar, which can never match; a mixed leaf is rejected outright.
        assert!(err.is_ok());
        let mixed = FilterExpr::parse(&json!({ "name": { "equals": "a", "bogus": 1 } }));
        assert!(mixed.is_err());
    }

    #[test]
    fn test_condition_string_ops() {
        assert!(Condition::Contains(json!("lic")).matches(&json!("alice")));
        assert!(Condition::StartsWith(json!("al")).matches(&json!("alice")));
        assert!(Condition::EndsWith(json!("ce")).matches(&json!("alice")));
        assert!(!Condition::Contains(json!("alice")).matches(&json!(42)));
    }

    #[test]
    fn test_condition_ordering() {
        assert!(Condition::Gt(json!(3)).matches(&json!(5)));
        assert!(Condition::Gte(json!(5)).matches(&json!(5)));
        assert!(Condition::Lt(json!("b")).matches(&json!("a")));
        assert!(!Condition::Lte(json!(2)).matches(&json!("a")));
    }

    #[test]
    fn test_condition_membership() {
        assert!(Condition::In(vec![json!(1), json!(2)]).matches(&json!(2)));
        assert!(Condition::NotIn(vec![json!(1), json!(2)]).matches(&json!(3)));
    }

    #[test]
    fn test_condition_not_negates() {
        let leaf = FieldFilter::parse(&json!({ "not": { "equals": "x" } })).unwrap();
        assert!(leaf.matches_value(&json!("y")));
        assert!(!leaf.matches_value(&json!("x")));
    }

    #[test]
    fn test_multi_operator_leaf_is_conjunctive() {
        let leaf = FieldFilter::parse(&json!({ "gte": 2, "lt": 5 })).unwrap();
        assert!(leaf.matches_value(&json!(3)));
        assert!(!leaf.matches_value(&json!(5)));
        assert!(!leaf.matches_value(&json!(1)));
    }

    #[test]
    fn test_matches_row_combinators() {
        let row: Map<String, Value> = json!({ "a": 1, "b": "x" })
            .as_object()
            .cloned()
            .unwrap();
        assert!(parse(json!({ "AND": [{ "a": { "equals": 1 } }, { "b": { "equals": "x" } }] }))
            .matches_row(&row));
        assert!(parse(json!({ "OR": [{ "a": { "equals": 2 } }, { "b": { "equals": "x" } }] }))
            .matches_row(&row));
        assert!(!parse(json!({ "NOT": { "a": { "equals": 1 } } })).matches_row(&row));
    }

    #[test]
    fn test_empty_or_never_matches() {
        let expr = FilterExpr {
            clauses: vec![FilterClause::Or(Vec::new())],
        };
        let row = Map::new();
        assert!(!expr.matches_row(&row));
    }

    #[test]
    fn test_selector_to_filter_equality() {
        let selector = Selector::parse(&json!({ "id": 3, "tenant": "t1" })).unwrap();
        let filter = selector.to_filter();
        let row: Map<String, Value> = json!({ "id": 3, "tenant": "t1" })
            .as_object()
            .cloned()
            .unwrap();
        assert!(filter.matches_row(&row));
        let other: Map<String, Value> = json!({ "id": 4, "tenant": "t1" })
            .as_object()
            .cloned()
            .unwrap();
        assert!(!filter.matches_row(&other));
    }

    #[test]
    fn test_merge_creates_and_clause() {
        let check = parse(json!({ "ownerId": { "equals": "u1" } }));
        let merged = merge_check_with_where(Some(parse(json!({ "title": { "contains": "x" } }))), &check);
        let and_len = merged
            .clauses
            .iter()
            .find_map(|c| match c {
                FilterClause::And(subs) => Some(subs.len()),
                _ => None,
            })
            .unwrap();
        assert_eq!(and_len, 1);
    }

    #[test]
    fn test_merge_appends_preserving_combinators() {
        let original = parse(json!({
            "OR": [{ "a": { "equals": 1 } }],
            "AND": [{ "b": { "equals": 2 } }]
        }));
        let c1 = parse(json!({ "ownerId": { "equals": "u1" } }));
        let c2 = parse(json!({ "tenant": { "equals": "t1" } }));
        let merged = merge_check_with_where(
            Some(merge_check_with_where(Some(original), &c1)),
            &c2,
        );
        let and_len = merged
            .clauses
            .iter()
            .find_map(|c| match c {
                FilterClause::And(subs) => Some(subs.len()),
                _ => None,
            })
            .unwrap();
        // one original AND entry plus both checks
        assert_eq!(and_len, 3);
        assert!(merged
            .clauses
            .iter()
            .any(|c| matches!(c, FilterClause::Or(_))));
    }

    #[test]
    fn test_merge_into_empty_where() {
        let check = parse(json!({ "ownerId": { "equals": "u1" } }));
        let merged = merge_check_with_where(None, &check);
        assert_eq!(merged, check);
    }

    #[test]
    fn test_to_value_round_trip() {
        let source = json!({
            "AND": [{ "a": { "equals": 1 } }],
            "name": { "startsWith": "al" }
        });
        let expr = parse(source);
        let rendered = expr.to_value();
        assert_eq!(parse(rendered), expr);
    }
}
