//! Fields of the `Query` and `Mutation` root types.
//!
//! Each model contributes three queries, a list, a cursor-paginated connection and a lookup by
//! unique field, and four mutations: create, update, upsert and delete.

use super::{
    args,
    names::{self, MUTATION, QUERY},
    object::{accessor, args as field_args, record, records, Page},
    registry::{Builder, OutputField, OutputFields, Resolve},
};
use crate::{
    domain::{Domain, ModelId},
    error::*,
};
use async_graphql::dynamic::{FieldValue, ResolverContext, TypeRef};
use async_graphql::Result;
use snafu::ensure;

/// Generate the root fields for every model.
pub fn synthesize(b: &mut Builder) -> Result<(), BuildError> {
    let domain = b.domain;
    let int = || TypeRef::named(TypeRef::INT);
    let strings = || TypeRef::named_list(TypeRef::STRING);

    for model in domain.models() {
        let i = model.id.0;
        let object = b.registry.named(b.objects[i]);
        let filter = b.registry.named(b.filters[i]);
        let lookup = b.registry.named_nn(b.lookups[i]);

        add(
            &mut b.query,
            QUERY,
            names::list_query(model),
            OutputField::new(b.registry.named_list(b.objects[i]), Resolve::List(model.id))
                .arg("where", filter.clone())
                .arg("limit", int())
                .arg("offset", int())
                .arg("orderBy", strings()),
        )?;
        add(
            &mut b.query,
            QUERY,
            names::connection_query(model),
            OutputField::new(
                b.registry.named_nn(b.connections[i]),
                Resolve::Connection(model.id),
            )
            .arg("where", filter)
            .arg("first", int())
            .arg("after", TypeRef::named(TypeRef::STRING))
            .arg("orderBy", strings()),
        )?;
        add(
            &mut b.query,
            QUERY,
            names::lookup_query(model),
            OutputField::new(object.clone(), Resolve::Lookup(model.id)).arg("where", lookup.clone()),
        )?;

        add(
            &mut b.mutation,
            MUTATION,
            names::create_mutation(model),
            OutputField::new(object.clone(), Resolve::Create(model.id))
                .arg("data", b.registry.named_nn(b.creates[i])),
        )?;
        add(
            &mut b.mutation,
            MUTATION,
            names::update_mutation(model),
            OutputField::new(object.clone(), Resolve::Update(model.id))
                .arg("where", lookup.clone())
                .arg("data", b.registry.named_nn(b.updates[i])),
        )?;
        add(
            &mut b.mutation,
            MUTATION,
            names::upsert_mutation(model),
            OutputField::new(object.clone(), Resolve::Upsert(model.id))
                .arg("create", b.registry.named_nn(b.creates[i]))
                .arg("update", b.registry.named_nn(b.updates[i])),
        )?;
        add(
            &mut b.mutation,
            MUTATION,
            names::delete_mutation(model),
            OutputField::new(object, Resolve::Delete(model.id)).arg("where", lookup),
        )?;
    }

    Ok(())
}

fn add(
    fields: &mut OutputFields,
    parent: &str,
    name: String,
    field: OutputField,
) -> Result<(), BuildError> {
    ensure!(
        !fields.contains_key(&name),
        DuplicateOperationSnafu { parent, name }
    );
    fields.insert(name, field);
    Ok(())
}

pub async fn resolve_list<'a>(
    domain: &Domain,
    model: ModelId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let options = args::query_options(field_args(ctx))?;
    let rows = accessor(ctx)?
        .query(domain.model(model), options)
        .await?;
    Ok(Some(records(rows)))
}

/// Resolve a connection query.
///
/// The data source is asked for one record beyond the requested page, whose presence alone tells
/// whether there is a next page.
pub async fn resolve_connection<'a>(
    domain: &Domain,
    model: ModelId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let request = args::page_request(field_args(ctx))?;
    let limit = request.limit;
    let mut edges = accessor(ctx)?
        .cursor_query(domain.model(model), request)
        .await?;
    let has_next_page = match limit {
        Some(limit) if edges.len() > limit => {
            edges.truncate(limit);
            true
        }
        _ => false,
    };
    Ok(Some(FieldValue::owned_any(Page {
        edges,
        has_next_page,
    })))
}

pub async fn resolve_lookup<'a>(
    domain: &Domain,
    model: ModelId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let filter = args::record(field_args(ctx), "where")?;
    let found = accessor(ctx)?.get(domain.model(model), filter).await?;
    Ok(found.map(record))
}

pub async fn resolve_create<'a>(
    domain: &Domain,
    model: ModelId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let data = args::record(field_args(ctx), "data")?;
    let created = accessor(ctx)?.create(domain.model(model), data).await?;
    Ok(Some(record(created)))
}

pub async fn resolve_update<'a>(
    domain: &Domain,
    model: ModelId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let args = field_args(ctx);
    let filter = args::record(args, "where")?;
    let data = args::record(args, "data")?;
    let updated = accessor(ctx)?
        .update(domain.model(model), data, filter)
        .await?;
    Ok(Some(record(updated)))
}

pub async fn resolve_upsert<'a>(
    domain: &Domain,
    model: ModelId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let args = field_args(ctx);
    let create = args::record(args, "create")?;
    let update = args::record(args, "update")?;
    let row = accessor(ctx)?
        .upsert(domain.model(model), create, update)
        .await?;
    Ok(Some(record(row)))
}

pub async fn resolve_delete<'a>(
    domain: &Domain,
    model: ModelId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let filter = args::record(field_args(ctx), "where")?;
    let deleted = accessor(ctx)?.delete(domain.model(model), filter).await?;
    Ok(Some(record(deleted)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::mock::Call;
    use crate::testing::{
        blog_domain, blog_schema, execute, field_args as arg_types, seed_blog, try_execute,
    };
    use crate::graphql::{filter, object, registry::Builder};
    use serde_json::json;

    fn pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, ty)| (name.to_string(), ty.to_string()))
            .collect()
    }

    #[async_std::test]
    async fn test_root_fields() {
        let (schema, _) = blog_schema();
        assert_eq!(
            arg_types(&schema, "Query", "users").await,
            pairs(&[
                ("where", "FilterUserInput"),
                ("limit", "Int"),
                ("offset", "Int"),
                ("orderBy", "[String]"),
            ])
        );
        assert_eq!(
            arg_types(&schema, "Query", "usersConnection").await,
            pairs(&[
                ("where", "FilterUserInput"),
                ("first", "Int"),
                ("after", "String"),
                ("orderBy", "[String]"),
            ])
        );
        assert_eq!(
            arg_types(&schema, "Query", "user").await,
            pairs(&[("where", "FindUserInput!")])
        );
        assert_eq!(
            arg_types(&schema, "Mutation", "updateUser").await,
            pairs(&[("where", "FindUserInput!"), ("data", "UpdateUserInput!")])
        );
        assert_eq!(
            arg_types(&schema, "Mutation", "upsertGroup").await,
            pairs(&[("create", "CreateGroupInput!"), ("update", "UpdateGroupInput!")])
        );
        assert_eq!(
            arg_types(&schema, "Mutation", "deletePost").await,
            pairs(&[("where", "FindPostInput!")])
        );
    }

    #[test]
    fn test_duplicate_operation() {
        let domain = blog_domain();
        let mut b = Builder::new(&domain);
        filter::synthesize(&mut b).unwrap();
        object::synthesize(&mut b).unwrap();
        crate::graphql::mutation::synthesize(&mut b).unwrap();
        b.query.insert(
            "users".into(),
            OutputField::new(TypeRef::named(TypeRef::INT), Resolve::EdgeCursor),
        );
        assert_eq!(
            synthesize(&mut b).unwrap_err(),
            BuildError::DuplicateOperation {
                parent: "Query".into(),
                name: "users".into(),
            }
        );
    }

    #[async_std::test]
    async fn test_list_and_lookup() {
        let (schema, db) = blog_schema();
        seed_blog(&db).await;

        let res = execute(
            &schema,
            &db,
            r#"{
                users(where: {active: true}, orderBy: ["-name"]) { name }
                user(where: {email: "bob@example.com"}) { name age }
                missing: user(where: {id: 42}) { name }
            }"#,
        )
        .await;
        assert_eq!(
            res,
            json!({
                "users": [{"name": "Cy"}, {"name": "Ada"}],
                "user": {"name": "Bob", "age": 25},
                "missing": null,
            })
        );

        let res = execute(
            &schema,
            &db,
            r#"{ users(orderBy: ["id"], limit: 1, offset: 1) { name } }"#,
        )
        .await;
        assert_eq!(res, json!({"users": [{"name": "Bob"}]}));
    }

    #[async_std::test]
    async fn test_connection() {
        let (schema, db) = blog_schema();
        seed_blog(&db).await;
        let query = |after: Option<&str>| {
            let after = after.map(|c| format!(", after: \"{c}\"")).unwrap_or_default();
            format!(
                r#"{{
                    usersConnection(first: 2, orderBy: ["id"]{after}) {{
                        pageInfo {{ startCursor endCursor hasNextPage }}
                        edges {{ cursor node {{ name }} }}
                        users {{ id }}
                    }}
                }}"#
            )
        };

        let res = execute(&schema, &db, &query(None)).await;
        let page = &res["usersConnection"];
        assert_eq!(page["pageInfo"]["hasNextPage"], json!(true));
        assert_eq!(page["users"], json!([{"id": 1}, {"id": 2}]));
        assert_eq!(page["edges"][0]["node"], json!({"name": "Ada"}));
        assert_eq!(page["pageInfo"]["startCursor"], page["edges"][0]["cursor"]);
        assert_eq!(page["pageInfo"]["endCursor"], page["edges"][1]["cursor"]);

        let end = page["pageInfo"]["endCursor"].as_str().unwrap().to_string();
        let res = execute(&schema, &db, &query(Some(&end))).await;
        let page = &res["usersConnection"];
        assert_eq!(page["pageInfo"]["hasNextPage"], json!(false));
        assert_eq!(page["users"], json!([{"id": 3}]));

        // Without a page size everything is returned on one page.
        let res = execute(
            &schema,
            &db,
            r#"{ usersConnection { pageInfo { hasNextPage } users { id } } }"#,
        )
        .await;
        assert_eq!(
            res,
            json!({"usersConnection": {
                "pageInfo": {"hasNextPage": false},
                "users": [{"id": 1}, {"id": 2}, {"id": 3}],
            }})
        );
    }

    #[async_std::test]
    async fn test_mutations() {
        let (schema, db) = blog_schema();
        seed_blog(&db).await;

        let res = execute(
            &schema,
            &db,
            r#"mutation {
                createGroup(data: {name: "Editors"}) { id name }
            }"#,
        )
        .await;
        assert_eq!(res, json!({"createGroup": {"id": 3, "name": "Editors"}}));

        let res = execute(
            &schema,
            &db,
            r#"mutation {
                updateGroup(where: {name: "Editors"}, data: {name: "Reviewers"}) { id name }
            }"#,
        )
        .await;
        assert_eq!(res, json!({"updateGroup": {"id": 3, "name": "Reviewers"}}));

        let res = execute(
            &schema,
            &db,
            r#"mutation {
                existing: upsertGroup(create: {name: "Readers"}, update: {name: "Lurkers"}) { id name }
                fresh: upsertGroup(create: {name: "Authors"}, update: {name: "Unused"}) { id name }
            }"#,
        )
        .await;
        assert_eq!(
            res,
            json!({
                "existing": {"id": 1, "name": "Lurkers"},
                "fresh": {"id": 4, "name": "Authors"},
            })
        );

        let res = execute(
            &schema,
            &db,
            r#"mutation { deleteGroup(where: {id: 3}) { name } }"#,
        )
        .await;
        assert_eq!(res, json!({"deleteGroup": {"name": "Reviewers"}}));
        assert!(db
            .calls()
            .await
            .contains(&Call::Delete { model: "Group".into() }));

        let res = execute(&schema, &db, r#"{ groups(orderBy: ["id"]) { name } }"#).await;
        assert_eq!(
            res,
            json!({"groups": [{"name": "Lurkers"}, {"name": "Writers"}, {"name": "Authors"}]})
        );
    }

    #[async_std::test]
    async fn test_data_source_errors() {
        let (schema, db) = blog_schema();
        seed_blog(&db).await;

        let res = try_execute(
            &schema,
            &db,
            r#"mutation { createUser(data: {email: "ada@example.com", name: "Ada", score: 1, active: true}) { id } }"#,
        )
        .await;
        assert_eq!(res.errors.len(), 1);
        assert!(res.errors[0].message.contains("duplicate value"));

        let res = try_execute(&schema, &db, r#"{ users(orderBy: ["shoeSize"]) { id } }"#).await;
        assert_eq!(res.errors.len(), 1);

        // A failing root field leaves its siblings intact.
        let res = try_execute(
            &schema,
            &db,
            r#"{ a: users(orderBy: ["bad"]) { id } b: groups(orderBy: ["id"]) { name } }"#,
        )
        .await;
        assert_eq!(res.errors.len(), 1, "{:?}", res.errors);
        assert_eq!(res.errors[0].path.len(), 1);
        let data = res.data.into_json().unwrap();
        assert_eq!(data["a"], serde_json::Value::Null);
        assert_eq!(data["b"], json!([{"name": "Readers"}, {"name": "Writers"}]));
    }
}
