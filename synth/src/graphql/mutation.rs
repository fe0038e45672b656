//! Create, update and upsert input types.
//!
//! Mutation inputs nest: a create input can create, connect or upsert the records its foreign keys
//! point at, and the records on the other side of its relations, so a single mutation can write a
//! whole object graph. Foreign keys take a parent input (`Create<Model>ParentInput` or
//! `Update<Model>ParentInput`). Relations take a child input whose shape depends on the relation:
//!
//! * to-one relations (unique back-reference) take `CreateOne<Rel>Input { connect, create }` and
//!   `UpdateOne<Rel>Input { connect, create, upsert, update }`;
//! * to-many relations take `CreateMany<Rel>Input { connect, create, upsert }` and
//!   `UpdateMany<Rel>Input`, which adds `update`, `delete` and `disconnect`, all lists;
//! * many-to-many relations take the same shapes as to-many relations, but nested records are
//!   records of the far model, using the far model's own input types.
//!
//! Nested child inputs omit the back-reference, which is implied by the parent.

use super::{
    names::{self, Cardinality},
    registry::{Builder, Fields, Handle},
    scalar,
};
use crate::{
    domain::{FieldKind, Model, Relation},
    error::BuildError,
};
use async_graphql::dynamic::TypeRef;

/// Generate mutation input types for every model.
pub fn synthesize(b: &mut Builder) -> Result<(), BuildError> {
    let domain = b.domain;

    for model in domain.models() {
        let create = b.registry.input(names::create(model))?;
        let update = b.registry.input(names::update(model))?;
        b.creates.push(create);
        b.updates.push(update);
    }
    for model in domain.models() {
        let i = model.id.0;
        let fields = [
            ("create", b.registry.named(b.creates[i])),
            ("update", b.registry.named(b.updates[i])),
        ];
        let upsert = own(b, names::upsert(model), fields)?;
        b.upserts.push(upsert);
    }

    let mut create_parents = vec![];
    let mut update_parents = vec![];
    for model in domain.models() {
        let i = model.id.0;
        let connect = b.registry.named(b.lookups[i]);
        let create = b.registry.named(b.creates[i]);
        let update = b.registry.named(b.updates[i]);
        let upsert = b.registry.named(b.upserts[i]);
        create_parents.push(own(
            b,
            names::create_parent(model),
            [
                ("connect", connect.clone()),
                ("create", create.clone()),
                ("upsert", upsert.clone()),
            ],
        )?);
        update_parents.push(own(
            b,
            names::update_parent(model),
            [
                ("connect", connect),
                ("create", create),
                ("update", update),
                ("upsert", upsert),
            ],
        )?);
    }

    for model in domain.models() {
        for field in &model.fields {
            let (create, update) = match &field.kind {
                FieldKind::Simple(column) => {
                    let ty = scalar(column.kind);
                    let required = if column.nullable || column.auto_increment {
                        ty.clone()
                    } else {
                        TypeRef::NonNull(Box::new(ty.clone()))
                    };
                    (required, ty)
                }
                FieldKind::ForeignKey { references, .. } => (
                    b.registry.named(create_parents[references.model.0]),
                    b.registry.named(update_parents[references.model.0]),
                ),
                FieldKind::Related { .. } => match domain.relation(field) {
                    Some(relation) => child_inputs(b, model, relation)?,
                    None => continue,
                },
            };
            b.registry
                .input_fields(b.creates[model.id.0])
                .insert(field.name.clone(), create);
            b.registry
                .input_fields(b.updates[model.id.0])
                .insert(field.name.clone(), update);
        }
    }

    Ok(())
}

/// Register an input type with the given fields.
fn own<'f>(
    b: &mut Builder,
    name: String,
    fields: impl IntoIterator<Item = (&'f str, TypeRef)>,
) -> Result<Handle, BuildError> {
    let handle = b.registry.input(name)?;
    b.registry
        .input_fields(handle)
        .extend(fields.into_iter().map(|(name, ty)| (name.to_string(), ty)));
    Ok(handle)
}

/// Register the nested inputs of a relation, returning the types of the relation's field in the
/// owning model's create and update inputs.
fn child_inputs(
    b: &mut Builder,
    model: &Model,
    relation: Relation,
) -> Result<(TypeRef, TypeRef), BuildError> {
    let rel = names::relation(model, relation.field);

    if relation.through.is_some() {
        let far = relation.far.id.0;
        let (connect, create, upsert) = (b.lookups[far], b.creates[far], b.upserts[far]);
        let fields = [
            ("where", b.registry.named(connect)),
            ("data", b.registry.named(b.updates[far])),
        ];
        let update = own(b, names::update_child(&rel, None), fields)?;
        return many(b, &rel, connect, create, upsert, update);
    }

    let target = relation.target.id.0;
    let back = &relation.back_reference.name;

    let connect = if relation.is_unique() {
        // The generic lookup type would admit the back-reference, which the parent implies.
        let connect = b.registry.input(names::connect_child(&rel))?;
        b.registry
            .set_input(connect, Fields::derived(b.lookups[target], back));
        connect
    } else {
        b.lookups[target]
    };
    let create = b.registry.input(names::create_child(&rel, None))?;
    b.registry
        .set_input(create, Fields::derived(b.creates[target], back));

    let update_fields = b.registry.input(names::update_child_fields(&rel))?;
    b.registry
        .set_input(update_fields, Fields::derived(b.updates[target], back));

    let fields = [
        ("create", b.registry.named(create)),
        ("update", b.registry.named(update_fields)),
    ];
    let upsert = own(b, names::upsert_child(&rel), fields)?;

    if relation.is_unique() {
        let update = b.registry.input(names::update_child(&rel, None))?;
        b.registry
            .set_input(update, Fields::derived(b.updates[target], back));

        let fields = [
            ("connect", b.registry.named(connect)),
            ("create", b.registry.named(create)),
        ];
        let create_one = own(b, names::create_child(&rel, Some(Cardinality::One)), fields)?;
        let fields = [
            ("connect", b.registry.named(connect)),
            ("create", b.registry.named(create)),
            ("upsert", b.registry.named(upsert)),
            ("update", b.registry.named(update)),
        ];
        let update_one = own(b, names::update_child(&rel, Some(Cardinality::One)), fields)?;
        Ok((b.registry.named(create_one), b.registry.named(update_one)))
    } else {
        let fields = [
            ("where", b.registry.named(connect)),
            ("data", b.registry.named(update_fields)),
        ];
        let update = own(b, names::update_child(&rel, None), fields)?;
        many(b, &rel, connect, create, upsert, update)
    }
}

/// Register the list-valued wrappers of a to-many relation.
fn many(
    b: &mut Builder,
    rel: &str,
    connect: Handle,
    create: Handle,
    upsert: Handle,
    update: Handle,
) -> Result<(TypeRef, TypeRef), BuildError> {
    let list = |h| b.registry.named_list(h);
    let create_fields = [
        ("connect", list(connect)),
        ("create", list(create)),
        ("upsert", list(upsert)),
    ];
    let update_fields = [
        ("connect", list(connect)),
        ("create", list(create)),
        ("upsert", list(upsert)),
        ("update", list(update)),
        ("delete", list(connect)),
        ("disconnect", list(connect)),
    ];
    let create_many = own(
        b,
        names::create_child(rel, Some(Cardinality::Many)),
        create_fields,
    )?;
    let update_many = own(
        b,
        names::update_child(rel, Some(Cardinality::Many)),
        update_fields,
    )?;
    Ok((b.registry.named(create_many), b.registry.named(update_many)))
}
