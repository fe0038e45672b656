//! Assembly of the executable schema.

use super::{
    fields, filter, mutation,
    names::{MUTATION, QUERY},
    object,
    registry::{Builder, OutputField, OutputFields, Resolve, Resolved},
};
use crate::{domain::Domain, error::BuildError};
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext, Schema,
};
use async_graphql::Result;
use async_std::sync::Arc;

/// Build the GraphQL schema for `domain`.
///
/// The schema is fully determined by the domain: building twice from the same domain yields
/// identical type and field names, in the same order. Resolvers in the returned schema expect an
/// [`Accessor`](crate::backend::Accessor) in the data of every request.
pub fn build_schema(domain: Domain) -> Result<Schema, BuildError> {
    let mut b = Builder::new(&domain);
    filter::synthesize(&mut b)?;
    object::synthesize(&mut b)?;
    mutation::synthesize(&mut b)?;
    fields::synthesize(&mut b)?;
    let Builder {
        registry,
        query,
        mutation,
        ..
    } = b;

    let domain = Arc::new(domain);
    let resolved = registry.resolved();
    tracing::info!(
        models = domain.models().len(),
        types = resolved.len(),
        "synthesized schema"
    );

    let mut schema = Schema::build(QUERY, Some(MUTATION), None);
    for (name, fields) in resolved {
        schema = match fields {
            Resolved::Input(fields) => {
                let mut input = InputObject::new(name);
                for (field, ty) in fields {
                    input = input.field(InputValue::new(field, ty));
                }
                schema.register(input)
            }
            Resolved::Object(fields) => schema.register(object_type(name, fields, &domain)),
        };
    }
    schema
        .register(object_type(QUERY, query, &domain))
        .register(object_type(MUTATION, mutation, &domain))
        .finish()
        .map_err(|err| BuildError::Schema {
            message: err.to_string(),
        })
}

fn object_type(name: &str, fields: OutputFields, domain: &Arc<Domain>) -> Object {
    fields
        .into_iter()
        .fold(Object::new(name), |object, (name, field)| {
            object.field(object_field(name, field, domain))
        })
}

fn object_field(name: String, field: OutputField, domain: &Arc<Domain>) -> Field {
    let resolve = field.resolve;
    let domain = domain.clone();
    let mut output = Field::new(name, field.ty, move |ctx| {
        let domain = domain.clone();
        FieldFuture::new(async move { dispatch(&domain, resolve, &ctx).await })
    });
    for (arg, ty) in field.args {
        output = output.argument(InputValue::new(arg, ty));
    }
    output
}

async fn dispatch<'a>(
    domain: &Domain,
    resolve: Resolve,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    match resolve {
        Resolve::Column(id) => object::resolve_column(domain, id, ctx),
        Resolve::ForeignKey(id) => object::resolve_foreign_key(domain, id, ctx).await,
        Resolve::Relation(id) => object::resolve_relation(domain, id, ctx).await,
        Resolve::EdgeNode => object::resolve_edge_node(ctx),
        Resolve::EdgeCursor => object::resolve_edge_cursor(ctx),
        Resolve::PageInfo
        | Resolve::Edges
        | Resolve::Nodes
        | Resolve::StartCursor
        | Resolve::EndCursor
        | Resolve::HasNextPage => object::resolve_page(resolve, ctx),
        Resolve::List(model) => fields::resolve_list(domain, model, ctx).await,
        Resolve::Connection(model) => fields::resolve_connection(domain, model, ctx).await,
        Resolve::Lookup(model) => fields::resolve_lookup(domain, model, ctx).await,
        Resolve::Create(model) => fields::resolve_create(domain, model, ctx).await,
        Resolve::Update(model) => fields::resolve_update(domain, model, ctx).await,
        Resolve::Upsert(model) => fields::resolve_upsert(domain, model, ctx).await,
        Resolve::Delete(model) => fields::resolve_delete(domain, model, ctx).await,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::domain::config::{DomainConfig, FieldConfig, ModelConfig};
    use crate::backend::mock::MockDataSource;
    use crate::testing::{
        blog_config, blog_domain, execute, input_fields, seed_blog, type_fields,
    };
    use futures::future::join_all;
    use serde_json::json;

    async fn type_names(schema: &Schema) -> Vec<String> {
        let res = schema.execute("{ __schema { types { name } } }").await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);
        res.data.into_json().unwrap()["__schema"]["types"]
            .as_array()
            .unwrap()
            .iter()
            .map(|ty| ty["name"].as_str().unwrap().to_string())
            .collect()
    }

    /// Every type the passes register, with its field names, in registration order.
    fn registered(domain: &Domain) -> Vec<(String, Vec<String>)> {
        let mut b = Builder::new(domain);
        filter::synthesize(&mut b).unwrap();
        object::synthesize(&mut b).unwrap();
        mutation::synthesize(&mut b).unwrap();
        fields::synthesize(&mut b).unwrap();
        b.registry
            .resolved()
            .into_iter()
            .map(|(name, fields)| {
                let fields = match fields {
                    Resolved::Input(fields) => fields.keys().cloned().collect(),
                    Resolved::Object(fields) => fields.keys().cloned().collect(),
                };
                (name.to_string(), fields)
            })
            .collect()
    }

    #[async_std::test]
    async fn test_deterministic() {
        let domain = blog_domain();
        assert_eq!(registered(&domain), registered(&blog_domain()));

        let first = build_schema(blog_domain()).unwrap();
        let second = build_schema(blog_domain()).unwrap();
        assert_eq!(first.sdl(), second.sdl());
        assert_eq!(type_names(&first).await, type_names(&second).await);
        for name in ["Query", "Mutation", "User"] {
            assert_eq!(
                type_fields(&first, name).await,
                type_fields(&second, name).await
            );
        }
        for name in ["FilterUserInput", "CreateUserInput", "UpdateGroupParentInput"] {
            assert_eq!(
                input_fields(&first, name).await,
                input_fields(&second, name).await
            );
        }
    }

    #[async_std::test]
    async fn test_generated_types() {
        let domain = blog_domain();
        let allocated = registered(&domain)
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        for model in ["User", "Profile", "Post", "Group", "Membership"] {
            for name in [
                model.to_string(),
                format!("{model}Edge"),
                format!("{model}Connection"),
                format!("Filter{model}Input"),
                format!("Find{model}Input"),
                format!("Create{model}Input"),
                format!("Update{model}Input"),
                format!("Upsert{model}Input"),
                format!("Create{model}ParentInput"),
                format!("Update{model}ParentInput"),
            ] {
                assert!(allocated.contains(&name), "missing {name}");
            }
        }

        // The published schema only carries types reachable from the roots. Parent inputs exist
        // only for models that foreign keys reference.
        let schema = build_schema(domain).unwrap();
        let names = type_names(&schema).await;
        for model in ["User", "Profile", "Post", "Group", "Membership"] {
            for name in [
                model.to_string(),
                format!("{model}Connection"),
                format!("Filter{model}Input"),
                format!("Find{model}Input"),
                format!("Create{model}Input"),
                format!("Update{model}Input"),
            ] {
                assert!(names.contains(&name), "missing {name}");
            }
        }
        for model in ["User", "Group"] {
            for name in [
                format!("Upsert{model}Input"),
                format!("Create{model}ParentInput"),
                format!("Update{model}ParentInput"),
            ] {
                assert!(names.contains(&name), "missing {name}");
            }
        }
        for name in ["CreateProfileParentInput", "UpdatePostParentInput"] {
            assert!(!names.contains(&name.to_string()), "unexpected {name}");
        }
        for name in ["PageInfo", "UserPosts", "UserProfile", "GroupMemberships"] {
            assert!(names.contains(&name.to_string()), "missing {name}");
        }
        // Many-to-many relations reuse the far model's object type.
        assert!(!names.contains(&"UserGroups".to_string()));
    }

    #[async_std::test]
    async fn test_concurrent_requests() {
        // One schema serves many requests at once, each against its own data source.
        let schema = build_schema(blog_domain()).unwrap();
        let seeded = MockDataSource::new(blog_domain());
        seed_blog(&seeded).await;
        let empty = MockDataSource::new(blog_domain());

        let query = r#"{ users(orderBy: ["id"]) { name posts { title } } }"#;
        let results = join_all((0..8).map(|i| {
            let schema = &schema;
            let db = if i % 2 == 0 { &seeded } else { &empty };
            async move { execute(schema, db, query).await }
        }))
        .await;
        for (i, res) in results.into_iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(res["users"].as_array().unwrap().len(), 3);
                assert_eq!(
                    res["users"][0],
                    json!({"name": "Ada", "posts": [{"title": "Engines"}, {"title": "Notes"}]})
                );
            } else {
                assert_eq!(res, json!({"users": []}));
            }
        }
    }

    fn build_error(config: DomainConfig) -> BuildError {
        match build_schema(Domain::new(config).unwrap()) {
            Ok(_) => panic!("schema built despite conflicting names"),
            Err(err) => err,
        }
    }

    #[test]
    fn test_duplicate_type() {
        let mut config = blog_config();
        config.models.push(ModelConfig {
            name: "UserPosts".into(),
            plural_name: None,
            fields: vec![FieldConfig::column("id", "int").key()],
        });
        assert_eq!(
            build_error(config),
            BuildError::DuplicateType {
                name: "FilterUserPostsInput".into()
            }
        );
    }

    #[test]
    fn test_reserved_name() {
        let config = DomainConfig {
            models: vec![ModelConfig {
                name: "Query".into(),
                plural_name: None,
                fields: vec![FieldConfig::column("id", "int").key()],
            }],
        };
        assert_eq!(
            build_error(config),
            BuildError::DuplicateType {
                name: "Query".into()
            }
        );
    }
}
