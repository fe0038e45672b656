//! Build-scoped state for one schema synthesis run.
//!
//! Generated types refer to one another cyclically: a model's object type exposes its relations,
//! whose types expose the model again. Types are therefore built in two phases. First every type is
//! allocated in the [`Registry`] under its final name, yielding a [`Handle`]. Later passes then
//! populate field maps, freely referring to any allocated type by name. Some field maps are not
//! stored at all but [derived](Fields::Derived) from another type's map, and are only computed
//! when the registry is materialized, after every pass has run.

use super::names::{MUTATION, QUERY};
use crate::domain::{Domain, FieldId, ModelId};
use crate::error::*;
use async_graphql::dynamic::{indexmap::IndexMap, TypeRef};
use snafu::ensure;
use std::collections::{HashMap, HashSet};

/// A type allocated in a [`Registry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(usize);

/// The fields of a generated input type, or the arguments of an object field.
pub type InputFields = IndexMap<String, TypeRef>;

/// The fields of a generated object type.
pub type OutputFields = IndexMap<String, OutputField>;

/// A field of a generated object type.
#[derive(Clone, Debug)]
pub struct OutputField {
    pub ty: TypeRef,
    pub args: InputFields,
    pub resolve: Resolve,
}

impl OutputField {
    pub fn new(ty: TypeRef, resolve: Resolve) -> Self {
        Self {
            ty,
            args: Default::default(),
            resolve,
        }
    }

    pub fn arg(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.args.insert(name.into(), ty);
        self
    }
}

/// How a generated object field obtains its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolve {
    /// A stored scalar, passed through from the parent record.
    Column(FieldId),
    /// The record referenced by a foreign key.
    ForeignKey(FieldId),
    /// The records reached through a relation field.
    Relation(FieldId),
    EdgeNode,
    EdgeCursor,
    PageInfo,
    Edges,
    Nodes,
    StartCursor,
    EndCursor,
    HasNextPage,
    List(ModelId),
    Connection(ModelId),
    Lookup(ModelId),
    Create(ModelId),
    Update(ModelId),
    Upsert(ModelId),
    Delete(ModelId),
}

/// A field map, either owned or derived from another type's.
#[derive(Clone, Debug)]
pub enum Fields<T> {
    Own(IndexMap<String, T>),
    /// The fields of `base`, less `exclude`, with `extra` fields added or overriding.
    ///
    /// If removing `exclude` would leave no fields at all and `keep_if_empty` is set, `exclude`
    /// is kept.
    Derived {
        base: Handle,
        exclude: Option<String>,
        keep_if_empty: bool,
        extra: IndexMap<String, T>,
    },
}

impl<T> Default for Fields<T> {
    fn default() -> Self {
        Self::Own(Default::default())
    }
}

impl<T> Fields<T> {
    pub fn derived(base: Handle, exclude: impl Into<String>) -> Self {
        Self::Derived {
            base,
            exclude: Some(exclude.into()),
            keep_if_empty: true,
            extra: Default::default(),
        }
    }

    /// Add a field, overriding any field of the same name.
    pub fn with(mut self, name: impl Into<String>, field: T) -> Self {
        match &mut self {
            Self::Own(fields) | Self::Derived { extra: fields, .. } => {
                fields.insert(name.into(), field);
            }
        }
        self
    }
}

/// The contents of a registered type.
#[derive(Clone, Debug)]
pub enum Shape {
    Input(Fields<TypeRef>),
    Object(Fields<OutputField>),
}

#[derive(Clone, Debug)]
struct Entry {
    name: String,
    shape: Shape,
}

/// Every named type generated in one synthesis run.
#[derive(Debug)]
pub struct Registry {
    entries: Vec<Entry>,
    names: HashSet<String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            entries: vec![],
            names: [QUERY, MUTATION].into_iter().map(String::from).collect(),
        }
    }
}

impl Registry {
    /// Allocate a new, empty type.
    ///
    /// Fails if the name is already taken.
    pub fn allocate(&mut self, name: String, shape: Shape) -> Result<Handle, BuildError> {
        ensure!(
            self.names.insert(name.clone()),
            DuplicateTypeSnafu { name }
        );
        tracing::debug!(%name, "allocated type");
        self.entries.push(Entry { name, shape });
        Ok(Handle(self.entries.len() - 1))
    }

    pub fn input(&mut self, name: String) -> Result<Handle, BuildError> {
        self.allocate(name, Shape::Input(Default::default()))
    }

    pub fn object(&mut self, name: String) -> Result<Handle, BuildError> {
        self.allocate(name, Shape::Object(Default::default()))
    }

    pub fn name(&self, handle: Handle) -> &str {
        &self.entries[handle.0].name
    }

    /// A nullable reference to `handle`.
    pub fn named(&self, handle: Handle) -> TypeRef {
        TypeRef::named(self.name(handle))
    }

    pub fn named_nn(&self, handle: Handle) -> TypeRef {
        TypeRef::named_nn(self.name(handle))
    }

    pub fn named_list(&self, handle: Handle) -> TypeRef {
        TypeRef::named_list(self.name(handle))
    }

    pub fn set_input(&mut self, handle: Handle, fields: Fields<TypeRef>) {
        self.entries[handle.0].shape = Shape::Input(fields);
    }

    pub fn set_object(&mut self, handle: Handle, fields: Fields<OutputField>) {
        self.entries[handle.0].shape = Shape::Object(fields);
    }

    /// The owned field map of an input type.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not an input type with an owned field map.
    pub fn input_fields(&mut self, handle: Handle) -> &mut InputFields {
        let entry = &mut self.entries[handle.0];
        match &mut entry.shape {
            Shape::Input(Fields::Own(fields)) => fields,
            _ => panic!("{} is not an input type with its own fields", entry.name),
        }
    }

    /// The owned field map of an object type.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not an object type with an owned field map.
    pub fn object_fields(&mut self, handle: Handle) -> &mut OutputFields {
        let entry = &mut self.entries[handle.0];
        match &mut entry.shape {
            Shape::Object(Fields::Own(fields)) => fields,
            _ => panic!("{} is not an object type with its own fields", entry.name),
        }
    }

    /// Every registered type with its resolved field map, in allocation order.
    pub fn resolved(&self) -> Vec<(&str, Resolved)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let resolved = match &entry.shape {
                    Shape::Input(_) => Resolved::Input(self.resolve(Handle(i), &Self::input_of)),
                    Shape::Object(_) => Resolved::Object(self.resolve(Handle(i), &Self::object_of)),
                };
                (entry.name.as_str(), resolved)
            })
            .collect()
    }

    fn input_of(shape: &Shape) -> Option<&Fields<TypeRef>> {
        match shape {
            Shape::Input(fields) => Some(fields),
            _ => None,
        }
    }

    fn object_of(shape: &Shape) -> Option<&Fields<OutputField>> {
        match shape {
            Shape::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Compute the field map of `handle`, following derivations.
    fn resolve<T: Clone>(
        &self,
        handle: Handle,
        fields_of: &impl Fn(&Shape) -> Option<&Fields<T>>,
    ) -> IndexMap<String, T> {
        match fields_of(&self.entries[handle.0].shape) {
            Some(Fields::Own(fields)) => fields.clone(),
            Some(Fields::Derived {
                base,
                exclude,
                keep_if_empty,
                extra,
            }) => {
                let base = self.resolve(*base, fields_of);
                let mut fields = base
                    .iter()
                    .filter(|(name, _)| Some(*name) != exclude.as_ref())
                    .map(|(name, field)| (name.clone(), field.clone()))
                    .collect::<IndexMap<_, _>>();
                if fields.is_empty() && *keep_if_empty {
                    fields = base;
                }
                fields.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                fields
            }
            None => Default::default(),
        }
    }
}

/// A materialized field map.
pub enum Resolved {
    Input(InputFields),
    Object(OutputFields),
}

/// State threaded through every synthesis pass.
pub struct Builder<'a> {
    pub domain: &'a Domain,
    pub registry: Registry,
    /// `Filter<Model>Input`, by model.
    pub filters: Vec<Handle>,
    /// `Find<Model>Input`, by model.
    pub lookups: Vec<Handle>,
    /// `Filter<Relation>Input`, by relation field.
    pub relation_filters: HashMap<FieldId, Handle>,
    pub objects: Vec<Handle>,
    pub connections: Vec<Handle>,
    /// Object types of direct relations, by relation field.
    pub relation_objects: HashMap<FieldId, Handle>,
    pub creates: Vec<Handle>,
    pub updates: Vec<Handle>,
    pub upserts: Vec<Handle>,
    pub query: OutputFields,
    pub mutation: OutputFields,
}

impl<'a> Builder<'a> {
    pub fn new(domain: &'a Domain) -> Self {
        Self {
            domain,
            registry: Registry::default(),
            filters: vec![],
            lookups: vec![],
            relation_filters: HashMap::new(),
            objects: vec![],
            connections: vec![],
            relation_objects: HashMap::new(),
            creates: vec![],
            updates: vec![],
            upserts: vec![],
            query: Default::default(),
            mutation: Default::default(),
        }
    }
}
