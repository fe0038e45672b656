//! Object types, relation object types and paginated connections.
//!
//! Every model is exposed as an object type of the same name. Scalar fields pass stored values
//! through, foreign keys resolve to the referenced record, and relation fields resolve to the
//! related records. A direct relation gets its own object type, named after the relation, which
//! is the target model's object type without the back-reference: a `User.posts` post need not
//! offer a way back to the user it was reached from. A many-to-many relation yields records of the
//! far model, typed with the far model's object type.
//!
//! Every model also gets an edge type and a connection type for cursor pagination, sharing a
//! single `PageInfo` type.

use super::{
    args::{self, Args},
    filter::Quantifier,
    names::{self, PAGE_INFO},
    registry::{Builder, Fields, OutputField, Resolve},
    scalar,
};
use crate::{
    backend::{Accessor, CursorEdge, Record},
    domain::{Domain, FieldId, FieldKind},
    error::BuildError,
};
use async_graphql::dynamic::{FieldValue, ResolverContext, TypeRef};
use async_graphql::{Error, Name, Result, Value};
use std::any::Any;

/// A page of a connection, as produced by a connection query.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub edges: Vec<CursorEdge>,
    pub has_next_page: bool,
}

/// Generate object, edge and connection types for every model.
pub fn synthesize(b: &mut Builder) -> Result<(), BuildError> {
    let domain = b.domain;

    let page_info = b.registry.object(PAGE_INFO.into())?;
    let fields = b.registry.object_fields(page_info);
    let string = || TypeRef::named(TypeRef::STRING);
    fields.insert(
        "startCursor".into(),
        OutputField::new(string(), Resolve::StartCursor),
    );
    fields.insert(
        "endCursor".into(),
        OutputField::new(string(), Resolve::EndCursor),
    );
    fields.insert(
        "hasNextPage".into(),
        OutputField::new(TypeRef::named(TypeRef::BOOLEAN), Resolve::HasNextPage),
    );

    // Allocate every object type before populating any, since they refer to one another.
    for model in domain.models() {
        let object = b.registry.object(model.name.clone())?;
        let edge = b.registry.object(names::edge(model))?;
        let connection = b.registry.object(names::connection(model))?;

        let node = b.registry.named(object);
        let fields = b.registry.object_fields(edge);
        fields.insert("node".into(), OutputField::new(node, Resolve::EdgeNode));
        fields.insert(
            "cursor".into(),
            OutputField::new(string(), Resolve::EdgeCursor),
        );

        let page_info_ty = b.registry.named(page_info);
        let edges = b.registry.named_list(edge);
        let nodes = b.registry.named_list(object);
        let fields = b.registry.object_fields(connection);
        fields.insert(
            "pageInfo".into(),
            OutputField::new(page_info_ty, Resolve::PageInfo),
        );
        fields.insert("edges".into(), OutputField::new(edges, Resolve::Edges));
        fields.insert(
            model.plural_name.clone(),
            OutputField::new(nodes, Resolve::Nodes),
        );

        b.objects.push(object);
        b.connections.push(connection);
    }

    for model in domain.models() {
        for relation in domain.relations(model) {
            if relation.through.is_some() {
                continue;
            }
            let handle = b.registry.object(names::relation(model, relation.field))?;
            b.registry.set_object(
                handle,
                Fields::derived(
                    b.objects[relation.target.id.0],
                    &relation.back_reference.name,
                ),
            );
            b.relation_objects.insert(relation.field.id, handle);
        }
    }

    for model in domain.models() {
        for field in &model.fields {
            let output = match &field.kind {
                FieldKind::Simple(column) => {
                    OutputField::new(scalar(column.kind), Resolve::Column(field.id))
                }
                FieldKind::ForeignKey { references, .. } => OutputField::new(
                    b.registry.named(b.objects[references.model.0]),
                    Resolve::ForeignKey(field.id),
                ),
                FieldKind::Related { .. } => {
                    let Some(relation) = domain.relation(field) else {
                        continue;
                    };
                    let (ty, filter) = if relation.through.is_some() {
                        let far = relation.far.id.0;
                        (
                            b.registry.named_list(b.objects[far]),
                            b.registry.named(b.filters[far]),
                        )
                    } else {
                        let object = b.relation_objects[&field.id];
                        let ty = if relation.is_unique() {
                            b.registry.named(object)
                        } else {
                            b.registry.named_list(object)
                        };
                        (ty, b.registry.named(b.relation_filters[&field.id]))
                    };
                    OutputField::new(ty, Resolve::Relation(field.id))
                        .arg("where", filter)
                        .arg("limit", TypeRef::named(TypeRef::INT))
                        .arg("offset", TypeRef::named(TypeRef::INT))
                        .arg("orderBy", TypeRef::named_list(TypeRef::STRING))
                }
            };
            b.registry
                .object_fields(b.objects[model.id.0])
                .insert(field.name.clone(), output);
        }
    }

    Ok(())
}

/// The value of the parent object of the field being resolved.
pub fn parent<'a, T: Any>(ctx: &ResolverContext<'a>) -> Result<&'a T> {
    let parent: &'a FieldValue<'a> = ctx.parent_value;
    parent
        .downcast_ref::<T>()
        .ok_or_else(|| Error::new("unexpected parent value"))
}

/// The data source attached to the request.
pub fn accessor<'a>(ctx: &ResolverContext<'a>) -> Result<&'a Accessor> {
    ctx.ctx.data::<Accessor>()
}

pub fn args<'b>(ctx: &'b ResolverContext) -> &'b Args {
    ctx.args.as_index_map()
}

pub fn record<'a>(record: Record) -> FieldValue<'a> {
    FieldValue::owned_any(record)
}

pub fn records<'a>(records: Vec<Record>) -> FieldValue<'a> {
    FieldValue::list(records.into_iter().map(FieldValue::owned_any))
}

fn stored<'r>(record: &'r Record, name: &str) -> &'r Value {
    static NULL: Value = Value::Null;
    record.get(name).unwrap_or(&NULL)
}

/// Resolve a scalar field by passing through the stored value.
pub fn resolve_column<'a>(
    domain: &Domain,
    id: FieldId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let row = parent::<Record>(ctx)?;
    Ok(match stored(row, &domain.field(id).name) {
        Value::Null => None,
        value => Some(FieldValue::value(value.clone())),
    })
}

/// Resolve a foreign key to the record it references.
///
/// If the selection on the referenced record asks for nothing but its key, the key is already
/// known locally and no fetch is made.
pub async fn resolve_foreign_key<'a>(
    domain: &Domain,
    id: FieldId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let row = parent::<Record>(ctx)?;
    let field = domain.field(id);
    let referenced = domain
        .referenced(field)
        .ok_or_else(|| Error::new(format!("{} is not a foreign key", field.name)))?;
    let value = stored(row, &field.name).clone();
    if value == Value::Null {
        return Ok(None);
    }

    let key = domain.model(referenced.model()).key_field();
    if referenced.id == key.id && selects_only(ctx, &key.name) {
        tracing::trace!(field = %field.name, "key-only selection, skipping fetch");
        let stub = Record::from_iter([(Name::new(&key.name), value)]);
        return Ok(Some(record(stub)));
    }

    Ok(accessor(ctx)?.load(referenced, value).await?.map(record))
}

/// Does the sub-selection of the field being resolved consist of exactly the field `name`?
fn selects_only(ctx: &ResolverContext, name: &str) -> bool {
    let field = ctx.ctx.field();
    let mut selection = field.selection_set();
    match (selection.next(), selection.next()) {
        (Some(field), None) => field.name() == name,
        _ => false,
    }
}

/// Resolve a relation field to the related records.
///
/// A to-one relation with no arguments is a point load by the parent's key. Otherwise, the
/// caller's filter is narrowed to records related to the parent and handed to a list query.
pub async fn resolve_relation<'a>(
    domain: &Domain,
    id: FieldId,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let row = parent::<Record>(ctx)?;
    let relation = domain
        .relation(domain.field(id))
        .ok_or_else(|| Error::new("not a relation"))?;
    let mut options = args::query_options(args(ctx))?;
    let key = stored(row, &relation.referenced.name).clone();
    if key == Value::Null {
        return Ok(if relation.is_unique() {
            None
        } else {
            Some(records(vec![]))
        });
    }

    let accessor = accessor(ctx)?;
    match &relation.through {
        None => {
            if relation.is_unique()
                && options.filter.is_empty()
                && options.limit.is_none()
                && options.order_by.is_empty()
            {
                let found = accessor.load(relation.back_reference, key).await?;
                return Ok(found.map(record));
            }
            args::inject(&mut options.filter, &relation.back_reference.name, key);
            let rows = accessor.query(relation.target, options).await?;
            if relation.is_unique() {
                Ok(rows.into_iter().next().map(record))
            } else {
                Ok(Some(records(rows)))
            }
        }
        Some(through) => {
            // Far records with some join record pointing back at the parent.
            let join = Record::from_iter([(Name::new(&relation.back_reference.name), key)]);
            args::inject(
                &mut options.filter,
                &Quantifier::Some.suffixed(&through.reverse.name),
                Value::Object(join),
            );
            let rows = accessor.query(relation.far, options).await?;
            Ok(Some(records(rows)))
        }
    }
}

pub fn resolve_edge_node<'a>(ctx: &ResolverContext<'a>) -> Result<Option<FieldValue<'a>>> {
    let edge = parent::<CursorEdge>(ctx)?;
    Ok(Some(record(edge.node.clone())))
}

pub fn resolve_edge_cursor<'a>(ctx: &ResolverContext<'a>) -> Result<Option<FieldValue<'a>>> {
    let edge = parent::<CursorEdge>(ctx)?;
    Ok(Some(FieldValue::value(edge.cursor.clone())))
}

pub fn resolve_page<'a>(
    resolve: Resolve,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let page = parent::<Page>(ctx)?;
    let cursor = |edge: Option<&CursorEdge>| edge.map(|e| FieldValue::value(e.cursor.clone()));
    Ok(match resolve {
        Resolve::PageInfo => Some(FieldValue::owned_any(page.clone())),
        Resolve::Edges => Some(FieldValue::list(
            page.edges.iter().cloned().map(FieldValue::owned_any),
        )),
        Resolve::Nodes => Some(records(
            page.edges.iter().map(|e| e.node.clone()).collect(),
        )),
        Resolve::StartCursor => cursor(page.edges.first()),
        Resolve::EndCursor => cursor(page.edges.last()),
        Resolve::HasNextPage => Some(FieldValue::value(page.has_next_page)),
        _ => return Err(Error::new("not a connection field")),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::mock::Call;
    use crate::testing::{blog_schema, execute, field, field_args, seed_blog, type_fields};
    use serde_json::json;

    #[async_std::test]
    async fn test_object_types() {
        let (schema, _) = blog_schema();
        let user = type_fields(&schema, "User").await;
        assert_eq!(field(&user, "email"), "String");
        assert_eq!(field(&user, "age"), "Int");
        assert_eq!(field(&user, "score"), "Float");
        assert_eq!(field(&user, "active"), "Boolean");
        assert_eq!(field(&user, "posts"), "[UserPosts]");
        assert_eq!(field(&user, "profile"), "UserProfile");
        assert_eq!(field(&user, "groups"), "[Group]");
        assert_eq!(field(&type_fields(&schema, "Post").await, "author"), "User");

        assert_eq!(
            field_args(&schema, "User", "posts").await,
            [
                ("where".to_string(), "FilterUserPostsInput".to_string()),
                ("limit".to_string(), "Int".to_string()),
                ("offset".to_string(), "Int".to_string()),
                ("orderBy".to_string(), "[String]".to_string()),
            ]
        );
        assert_eq!(
            field_args(&schema, "User", "groups").await[0].1,
            "FilterGroupInput"
        );

        let connection = type_fields(&schema, "UserConnection").await;
        assert_eq!(field(&connection, "pageInfo"), "PageInfo");
        assert_eq!(field(&connection, "edges"), "[UserEdge]");
        assert_eq!(field(&connection, "users"), "[User]");
        let edge = type_fields(&schema, "UserEdge").await;
        assert_eq!(field(&edge, "node"), "User");
        assert_eq!(field(&edge, "cursor"), "String");
        let page_info = type_fields(&schema, "PageInfo").await;
        assert_eq!(field(&page_info, "hasNextPage"), "Boolean");
    }

    #[async_std::test]
    async fn test_relation_object_excludes_back_reference() {
        let (schema, _) = blog_schema();
        let posts = type_fields(&schema, "UserPosts").await;
        assert_eq!(field(&posts, "title"), "String");
        assert!(posts.iter().all(|(name, _)| name != "author"));

        let profile = type_fields(&schema, "UserProfile").await;
        assert!(profile.iter().all(|(name, _)| name != "user"));
    }

    #[async_std::test]
    async fn test_fetch_avoidance() {
        let (schema, db) = blog_schema();
        seed_blog(&db).await;

        let res = execute(&schema, &db, "{ posts(orderBy: [\"id\"]) { author { id } } }").await;
        assert_eq!(
            res,
            json!({"posts": [{"author": {"id": 1}}, {"author": {"id": 1}}, {"author": {"id": 2}}]})
        );
        assert!(!db
            .calls()
            .await
            .iter()
            .any(|call| matches!(call, Call::Load { .. })));

        db.clear_calls().await;
        let res = execute(&schema, &db, "{ post(where: {id: 3}) { author { id name } } }").await;
        assert_eq!(res, json!({"post": {"author": {"id": 2, "name": "Bob"}}}));
        let loads = db
            .calls()
            .await
            .into_iter()
            .filter(|call| matches!(call, Call::Load { .. }))
            .collect::<Vec<_>>();
        assert_eq!(
            loads,
            [Call::Load {
                model: "User".into(),
                field: "id".into(),
                key: Value::from(2)
            }]
        );
    }

    #[async_std::test]
    async fn test_to_one_relation() {
        let (schema, db) = blog_schema();
        seed_blog(&db).await;

        let res = execute(
            &schema,
            &db,
            "{ users(orderBy: [\"id\"]) { name profile { bio } } }",
        )
        .await;
        assert_eq!(
            res,
            json!({"users": [
                {"name": "Ada", "profile": {"bio": "Engineer"}},
                {"name": "Bob", "profile": null},
                {"name": "Cy", "profile": null},
            ]})
        );
        assert!(db.calls().await.iter().any(|call| matches!(
            call,
            Call::Load { model, field, .. } if model == "Profile" && field == "user"
        )));

        // With arguments, the relation is queried but still reduced to a single object.
        let res = execute(
            &schema,
            &db,
            "{ user(where: {id: 1}) { profile(where: {bio_like: \"Eng%\"}) { bio } } }",
        )
        .await;
        assert_eq!(res, json!({"user": {"profile": {"bio": "Engineer"}}}));
    }

    #[async_std::test]
    async fn test_to_many_relation() {
        let (schema, db) = blog_schema();
        seed_blog(&db).await;

        let res = execute(
            &schema,
            &db,
            "{ user(where: {email: \"ada@example.com\"}) { posts(orderBy: [\"-id\"], limit: 1) { title } } }",
        )
        .await;
        assert_eq!(res, json!({"user": {"posts": [{"title": "Notes"}]}}));

        let res = execute(
            &schema,
            &db,
            "{ user(where: {id: 3}) { posts { title } } }",
        )
        .await;
        assert_eq!(res, json!({"user": {"posts": []}}));
    }

    #[async_std::test]
    async fn test_through_relation() {
        let (schema, db) = blog_schema();
        seed_blog(&db).await;

        let res = execute(
            &schema,
            &db,
            "{ user(where: {id: 1}) { groups(orderBy: [\"name\"]) { name } } }",
        )
        .await;
        assert_eq!(
            res,
            json!({"user": {"groups": [{"name": "Readers"}, {"name": "Writers"}]}})
        );

        let res = execute(
            &schema,
            &db,
            "{ group(where: {name: \"Readers\"}) { members(orderBy: [\"id\"]) { name } } }",
        )
        .await;
        assert_eq!(
            res,
            json!({"group": {"members": [{"name": "Ada"}, {"name": "Bob"}]}})
        );
    }
}
