//! Fixtures for testing schemas against an in-memory database.
//!
//! The fixtures are built around a small blogging domain, described in `domains/blog.json`:
//! users write posts, may have a profile, and join groups through memberships.

use crate::{
    backend::{mock::MockDataSource, Accessor},
    build_schema,
    domain::{config::DomainConfig, Domain},
};
use async_graphql::{dynamic::Schema, Request, Response};
use async_std::sync::Arc;
use serde_json::{json, Value};

const BLOG: &str = include_str!("../domains/blog.json");

pub fn blog_config() -> DomainConfig {
    serde_json::from_str(BLOG).expect("blog domain is valid JSON")
}

pub fn blog_domain() -> Domain {
    Domain::new(blog_config()).expect("blog domain is consistent")
}

/// The blog schema, together with an empty database to run it against.
pub fn blog_schema() -> (Schema, MockDataSource) {
    let schema = build_schema(blog_domain()).expect("blog schema builds");
    (schema, MockDataSource::new(blog_domain()))
}

/// Populate `db` with a few users, their posts, profiles and group memberships.
pub async fn seed_blog(db: &MockDataSource) {
    let tables = [
        (
            "User",
            vec![
                json!({"id": 1, "email": "ada@example.com", "name": "Ada", "age": 36, "score": 9.5, "active": true}),
                json!({"id": 2, "email": "bob@example.com", "name": "Bob", "age": 25, "score": 4.0, "active": false}),
                json!({"id": 3, "email": "cy@example.org", "name": "Cy", "age": null, "score": 7.25, "active": true}),
            ],
        ),
        (
            "Profile",
            vec![json!({"id": 1, "user": 1, "bio": "Engineer"})],
        ),
        (
            "Post",
            vec![
                json!({"id": 1, "title": "Engines", "body": "", "author": 1}),
                json!({"id": 2, "title": "Notes", "body": "", "author": 1}),
                json!({"id": 3, "title": "Hello", "body": "", "author": 2}),
            ],
        ),
        (
            "Group",
            vec![
                json!({"id": 1, "name": "Readers"}),
                json!({"id": 2, "name": "Writers"}),
            ],
        ),
        (
            "Membership",
            vec![
                json!({"id": 1, "user": 1, "group": 1}),
                json!({"id": 2, "user": 1, "group": 2}),
                json!({"id": 3, "user": 2, "group": 1}),
            ],
        ),
    ];
    for (model, rows) in tables {
        db.seed(model, rows).await.unwrap();
    }
}

/// Run a request against `db`, returning the raw response.
pub async fn try_execute(schema: &Schema, db: &MockDataSource, query: &str) -> Response {
    let accessor: Accessor = Arc::new(db.clone());
    schema.execute(Request::new(query).data(accessor)).await
}

/// Run a request against `db`, which must succeed, returning the response data.
pub async fn execute(schema: &Schema, db: &MockDataSource, query: &str) -> Value {
    let res = try_execute(schema, db, query).await;
    assert!(res.errors.is_empty(), "{query}: {:?}", res.errors);
    res.data.into_json().unwrap()
}

const TYPE_REF: &str = "fragment TypeRef on __Type {
    kind name ofType { kind name ofType { kind name ofType { kind name } } }
}";

async fn introspect(schema: &Schema, query: String) -> Value {
    let res = schema.execute(format!("{query} {TYPE_REF}")).await;
    assert!(res.errors.is_empty(), "{:?}", res.errors);
    res.data.into_json().unwrap()
}

/// Render an introspected type reference the way it is written in SDL, such as `[Int]!`.
fn render(ty: &Value) -> String {
    match ty["kind"].as_str() {
        Some("NON_NULL") => format!("{}!", render(&ty["ofType"])),
        Some("LIST") => format!("[{}]", render(&ty["ofType"])),
        _ => ty["name"].as_str().unwrap().to_string(),
    }
}

fn pairs(fields: &Value) -> Vec<(String, String)> {
    fields
        .as_array()
        .unwrap()
        .iter()
        .map(|field| {
            (
                field["name"].as_str().unwrap().to_string(),
                render(&field["type"]),
            )
        })
        .collect()
}

/// The fields of the object type `name`, with their types.
pub async fn type_fields(schema: &Schema, name: &str) -> Vec<(String, String)> {
    let data = introspect(
        schema,
        format!(r#"{{ __type(name: "{name}") {{ fields {{ name type {{ ...TypeRef }} }} }} }}"#),
    )
    .await;
    pairs(&data["__type"]["fields"])
}

/// The fields of the input type `name`, with their types.
pub async fn input_fields(schema: &Schema, name: &str) -> Vec<(String, String)> {
    let data = introspect(
        schema,
        format!(
            r#"{{ __type(name: "{name}") {{ inputFields {{ name type {{ ...TypeRef }} }} }} }}"#
        ),
    )
    .await;
    pairs(&data["__type"]["inputFields"])
}

/// The arguments of the field `ty.field`, with their types.
pub async fn field_args(schema: &Schema, ty: &str, field: &str) -> Vec<(String, String)> {
    let data = introspect(
        schema,
        format!(
            r#"{{ __type(name: "{ty}") {{ fields {{ name args {{ name type {{ ...TypeRef }} }} }} }} }}"#
        ),
    )
    .await;
    let fields = data["__type"]["fields"].as_array().unwrap();
    let field = fields
        .iter()
        .find(|f| f["name"] == field)
        .unwrap_or_else(|| panic!("{ty} has no field {field}"));
    pairs(&field["args"])
}

/// The type of `name` among introspected `fields`.
pub fn field(fields: &[(String, String)], name: &str) -> String {
    fields
        .iter()
        .find(|(field, _)| field == name)
        .map(|(_, ty)| ty.clone())
        .unwrap_or_else(|| panic!("no field {name}"))
}
