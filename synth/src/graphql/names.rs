//! Names of generated types and fields.
//!
//! Consumers of a generated API depend on these names, so they follow a fixed convention:
//! object types are named after their model, and input types wrap the model or relation name in
//! a verb prefix and an `Input` suffix, as in `FilterUserInput` or `CreateManyUserPostsInput`.

use crate::domain::{Field, Model};
use strum::Display;

pub const QUERY: &str = "Query";
pub const MUTATION: &str = "Mutation";
pub const PAGE_INFO: &str = "PageInfo";

/// Convert a `snake_case`, `kebab-case` or `camelCase` name to `PascalCase`.
pub fn pascal_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .map(upper_first)
        .collect()
}

pub fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Cardinality qualifier for nested relation inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Cardinality {
    One,
    Many,
}

/// The name identifying a relation in generated type names: the owning model followed by the
/// relation field, e.g. `UserPosts` for `User.posts`.
pub fn relation(model: &Model, field: &Field) -> String {
    format!("{}{}", pascal_case(&model.name), pascal_case(&field.name))
}

pub fn filter(name: &str) -> String {
    format!("Filter{name}Input")
}

pub fn find(model: &Model) -> String {
    format!("Find{}Input", model.name)
}

pub fn create(model: &Model) -> String {
    format!("Create{}Input", model.name)
}

pub fn update(model: &Model) -> String {
    format!("Update{}Input", model.name)
}

pub fn upsert(model: &Model) -> String {
    format!("Upsert{}Input", model.name)
}

pub fn create_parent(model: &Model) -> String {
    format!("Create{}ParentInput", model.name)
}

pub fn update_parent(model: &Model) -> String {
    format!("Update{}ParentInput", model.name)
}

pub fn edge(model: &Model) -> String {
    format!("{}Edge", model.name)
}

pub fn connection(model: &Model) -> String {
    format!("{}Connection", model.name)
}

pub fn connect_child(relation: &str) -> String {
    format!("Connect{relation}Input")
}

/// `Create<Rel>Input`, or `Create<One|Many><Rel>Input` for the cardinality-specific wrapper.
pub fn create_child(relation: &str, qualifier: Option<Cardinality>) -> String {
    format!("Create{}{relation}Input", qualified(qualifier))
}

/// `Update<Rel>Input`, or `Update<One|Many><Rel>Input` for the cardinality-specific wrapper.
pub fn update_child(relation: &str, qualifier: Option<Cardinality>) -> String {
    format!("Update{}{relation}Input", qualified(qualifier))
}

pub fn update_child_fields(relation: &str) -> String {
    format!("{}Fields", update_child(relation, None))
}

pub fn upsert_child(relation: &str) -> String {
    format!("Upsert{relation}Input")
}

fn qualified(qualifier: Option<Cardinality>) -> String {
    qualifier.map(|q| q.to_string()).unwrap_or_default()
}

/// Query field listing records of a model.
pub fn list_query(model: &Model) -> String {
    model.plural_name.clone()
}

pub fn connection_query(model: &Model) -> String {
    format!("{}Connection", model.plural_name)
}

pub fn lookup_query(model: &Model) -> String {
    model.singular_name()
}

pub fn create_mutation(model: &Model) -> String {
    format!("create{}", model.name)
}

pub fn update_mutation(model: &Model) -> String {
    format!("update{}", model.name)
}

pub fn upsert_mutation(model: &Model) -> String {
    format!("upsert{}", model.name)
}

pub fn delete_mutation(model: &Model) -> String {
    format!("delete{}", model.name)
}
