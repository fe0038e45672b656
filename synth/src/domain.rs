//! The relational domain model from which a schema is synthesized.
//!
//! A [`Domain`] is an arena of [`Model`]s, each owning an ordered list of [`Field`]s. Fields refer
//! to one another by [`FieldId`], an index into the arena, so the cyclic graph of references
//! between models (a foreign key one way, its reverse relation the other) needs no shared
//! ownership. A [`Domain`] can only be obtained from [`Domain::new`], which validates the whole
//! description, so every reference held by a constructed domain is known to resolve.

use crate::error::*;
use crate::graphql::names::lower_first;
use snafu::{ensure, OptionExt};
use std::collections::hash_map::{Entry, HashMap};
use strum::Display;

pub mod config;

pub use config::{DomainConfig, FieldConfig, ModelConfig, Reference};

/// Index of a model in its [`Domain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelId(pub usize);

/// Index of a field in its [`Domain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId {
    pub model: ModelId,
    pub index: usize,
}

/// The GraphQL scalar a storage type is exposed as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum ScalarKind {
    String,
    Int,
    Float,
    Boolean,
}

impl ScalarKind {
    /// Classify a storage type tag, such as `varchar(32)`, `integer` or `double precision`.
    ///
    /// Unrecognized types are exposed as strings.
    pub fn from_storage_type(ty: &str) -> Self {
        let ty = ty.to_lowercase();
        if ty.contains("char") || ty.contains("text") {
            Self::String
        } else if ty.starts_with("int") {
            Self::Int
        } else if ty.contains("float") || ty.contains("double") {
            Self::Float
        } else if ty.starts_with("bool") {
            Self::Boolean
        } else {
            Self::String
        }
    }
}

/// A stored scalar column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub storage_type: String,
    pub kind: ScalarKind,
    pub nullable: bool,
    pub auto_increment: bool,
    pub unique: bool,
}

/// The variant-specific part of a [`Field`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// A scalar column.
    Simple(Column),
    /// A column holding the value of a unique field of another model.
    ForeignKey { column: Column, references: FieldId },
    /// A virtual field, the reverse of the foreign key `back_reference`.
    ///
    /// If `through` is set, `back_reference` lives on a join model and the relation continues one
    /// hop further to the far model.
    Related {
        back_reference: FieldId,
        through: Option<Through>,
    },
}

/// The second hop of a many-to-many relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Through {
    /// The join model's foreign key to the far model.
    pub foreign_key: FieldId,
    /// The far model's direct relation back to the join model through `foreign_key`.
    pub reverse: FieldId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn model(&self) -> ModelId {
        self.id.model
    }

    /// The stored column backing this field, if it is not virtual.
    pub fn column(&self) -> Option<&Column> {
        match &self.kind {
            FieldKind::Simple(column) | FieldKind::ForeignKey { column, .. } => Some(column),
            FieldKind::Related { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    pub plural_name: String,
    pub fields: Vec<Field>,
    key: usize,
}

impl Model {
    /// The field uniquely identifying each record of this model.
    pub fn key_field(&self) -> &Field {
        &self.fields[self.key]
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The name of the query field which looks up one record, e.g. `user` for `User`.
    pub fn singular_name(&self) -> String {
        lower_first(&self.name)
    }
}

/// A relation field resolved against the rest of the domain.
#[derive(Clone, Copy, Debug)]
pub struct Relation<'a> {
    /// The virtual field on the owning model.
    pub field: &'a Field,
    /// The foreign key on the target model which points back at the owning model.
    pub back_reference: &'a Field,
    /// The field of the owning model which `back_reference` references.
    pub referenced: &'a Field,
    /// The model owning `back_reference`: the related model, or the join model of a
    /// many-to-many relation.
    pub target: &'a Model,
    /// The model whose records the relation yields.
    pub far: &'a Model,
    /// The far hop of a many-to-many relation.
    pub through: Option<ThroughJoin<'a>>,
    unique: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ThroughJoin<'a> {
    pub foreign_key: &'a Field,
    pub reverse: &'a Field,
}

impl<'a> Relation<'a> {
    /// Does this relation yield at most one record?
    ///
    /// This holds for direct relations whose back-reference is unique.
    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

/// A validated domain model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain {
    models: Vec<Model>,
}

impl Domain {
    /// Check `config` and resolve it into a domain.
    ///
    /// Fails with a descriptive error if any model or field is malformed or refers to something
    /// which does not exist.
    pub fn new(config: DomainConfig) -> Result<Self, BuildError> {
        Resolver::new(&config)?.resolve()
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn model(&self, id: ModelId) -> &Model {
        &self.models[id.0]
    }

    pub fn model_by_name(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.model(id.model).fields[id.index]
    }

    /// A field is unique if it is the key of its model or a column flagged unique.
    pub fn is_unique(&self, field: &Field) -> bool {
        let model = self.model(field.model());
        model.key == field.id.index || field.column().map(|c| c.unique).unwrap_or(false)
    }

    /// The field referenced by a foreign key.
    pub fn referenced(&self, field: &Field) -> Option<&Field> {
        match &field.kind {
            FieldKind::ForeignKey { references, .. } => Some(self.field(*references)),
            _ => None,
        }
    }

    /// Resolve a relation field.
    pub fn relation<'a>(&'a self, field: &'a Field) -> Option<Relation<'a>> {
        let FieldKind::Related {
            back_reference,
            through,
        } = &field.kind
        else {
            return None;
        };
        let back_reference = self.field(*back_reference);
        let referenced = self.referenced(back_reference)?;
        let target = self.model(back_reference.model());
        let through = through.map(|t| ThroughJoin {
            foreign_key: self.field(t.foreign_key),
            reverse: self.field(t.reverse),
        });
        let far = match &through {
            Some(t) => self.model(t.reverse.model()),
            None => target,
        };
        Some(Relation {
            field,
            back_reference,
            referenced,
            target,
            far,
            unique: through.is_none() && self.is_unique(back_reference),
            through,
        })
    }

    /// All relations declared on `model`, in field order.
    pub fn relations<'a>(&'a self, model: &'a Model) -> impl Iterator<Item = Relation<'a>> + 'a {
        model.fields.iter().filter_map(move |f| self.relation(f))
    }
}

/// Name lookup tables for resolving a [`DomainConfig`].
struct Resolver<'a> {
    config: &'a DomainConfig,
    models: HashMap<&'a str, usize>,
    fields: Vec<HashMap<&'a str, usize>>,
}

impl<'a> Resolver<'a> {
    fn new(config: &'a DomainConfig) -> Result<Self, BuildError> {
        ensure!(!config.models.is_empty(), EmptyDomainSnafu);

        let mut models = HashMap::new();
        let mut fields = vec![];
        for (i, model) in config.models.iter().enumerate() {
            if models.insert(model.name.as_str(), i).is_some() {
                return DuplicateModelSnafu { model: &model.name }.fail();
            }
            let mut names = HashMap::new();
            for (j, field) in model.fields.iter().enumerate() {
                match names.entry(field.name.as_str()) {
                    Entry::Occupied(_) => {
                        return DuplicateFieldSnafu {
                            model: &model.name,
                            field: &field.name,
                        }
                        .fail()
                    }
                    Entry::Vacant(e) => {
                        e.insert(j);
                    }
                }
            }
            fields.push(names);
        }

        Ok(Self {
            config,
            models,
            fields,
        })
    }

    fn resolve(&self) -> Result<Domain, BuildError> {
        let mut models = vec![];
        for (i, model) in self.config.models.iter().enumerate() {
            let id = ModelId(i);
            let mut fields = vec![];
            for (j, field) in model.fields.iter().enumerate() {
                fields.push(Field {
                    id: FieldId {
                        model: id,
                        index: j,
                    },
                    name: field.name.clone(),
                    kind: self.field_kind(model, field)?,
                });
            }
            let key = self.key(model, &fields)?;
            models.push(Model {
                id,
                name: model.name.clone(),
                plural_name: model
                    .plural_name
                    .clone()
                    .unwrap_or_else(|| format!("{}s", lower_first(&model.name))),
                fields,
                key,
            });
        }

        let domain = Domain { models };
        for model in domain.models() {
            for field in &model.fields {
                if let Some(referenced) = domain.referenced(field) {
                    ensure!(
                        domain.is_unique(referenced),
                        NotUniqueSnafu {
                            model: &model.name,
                            field: &field.name,
                            target: self.qualified(referenced.id),
                        }
                    );
                }
            }
        }
        Ok(domain)
    }

    fn key(&self, model: &ModelConfig, fields: &[Field]) -> Result<usize, BuildError> {
        let keys = model
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        match keys.as_slice() {
            [] => MissingKeySnafu { model: &model.name }.fail(),
            [key] => {
                ensure!(
                    matches!(fields[*key].kind, FieldKind::Simple(_)),
                    InvalidKeySnafu {
                        model: &model.name,
                        field: &fields[*key].name,
                    }
                );
                Ok(*key)
            }
            keys => MultipleKeysSnafu {
                model: &model.name,
                fields: keys
                    .iter()
                    .map(|i| model.fields[*i].name.clone())
                    .collect::<Vec<_>>(),
            }
            .fail(),
        }
    }

    fn field_kind(&self, model: &ModelConfig, field: &FieldConfig) -> Result<FieldKind, BuildError> {
        ensure!(
            field.references.is_none() || (field.related.is_none() && field.through.is_none()),
            ConflictingFieldSnafu {
                model: &model.name,
                field: &field.name,
            }
        );
        ensure!(
            field.through.is_none() || field.related.is_some(),
            ConflictingFieldSnafu {
                model: &model.name,
                field: &field.name,
            }
        );

        if let Some(references) = &field.references {
            let target = self.lookup(model, field, references)?;
            let storage_type = self.storage_type(model, field, 0)?;
            return Ok(FieldKind::ForeignKey {
                column: self.column(field, storage_type),
                references: target,
            });
        }

        if let Some(related) = &field.related {
            let back_reference = self.lookup(model, field, related)?;
            let back_config = self.config_of(back_reference);
            let Some(points_at) = &back_config.references else {
                return NotForeignKeySnafu {
                    model: &model.name,
                    field: &field.name,
                    target: related.to_string(),
                }
                .fail();
            };
            ensure!(
                points_at.model == model.name,
                BackReferenceMismatchSnafu {
                    model: &model.name,
                    field: &field.name,
                    target: related.to_string(),
                }
            );

            let through = match &field.through {
                Some(name) => Some(self.through(model, field, &related.model, name)?),
                None => None,
            };
            return Ok(FieldKind::Related {
                back_reference,
                through,
            });
        }

        let storage_type = field
            .column_type
            .clone()
            .context(MissingTypeSnafu {
                model: &model.name,
                field: &field.name,
            })?;
        Ok(FieldKind::Simple(self.column(field, storage_type)))
    }

    /// Resolve the far hop of a many-to-many relation through `join.through`.
    fn through(
        &self,
        model: &ModelConfig,
        field: &FieldConfig,
        join: &str,
        through: &str,
    ) -> Result<Through, BuildError> {
        let foreign_key = self.lookup(model, field, &Reference::new(join, through))?;
        let Some(far) = &self.config_of(foreign_key).references else {
            return NotForeignKeySnafu {
                model: &model.name,
                field: &field.name,
                target: format!("{join}.{through}"),
            }
            .fail();
        };
        let far_id = self.model_id(model, field, &far.model)?;
        let reverse = self.config.models[far_id]
            .fields
            .iter()
            .position(|f| {
                f.through.is_none()
                    && f.related.as_ref().map_or(false, |r| {
                        r.model == join && r.field == through
                    })
            })
            .context(MissingThroughReverseSnafu {
                model: &model.name,
                field: &field.name,
                target: &far.model,
            })?;
        Ok(Through {
            foreign_key,
            reverse: FieldId {
                model: ModelId(far_id),
                index: reverse,
            },
        })
    }

    /// The storage type of a foreign key, following references until an explicit type is found.
    fn storage_type(
        &self,
        model: &ModelConfig,
        field: &FieldConfig,
        depth: usize,
    ) -> Result<String, BuildError> {
        if let Some(ty) = &field.column_type {
            return Ok(ty.clone());
        }
        let missing = MissingTypeSnafu {
            model: &model.name,
            field: &field.name,
        };
        match &field.references {
            Some(references) if depth < self.config.models.len() => {
                let target = self.lookup(model, field, references)?;
                let target_model = &self.config.models[target.model.0];
                self.storage_type(target_model, self.config_of(target), depth + 1)
                    .map_err(|_| missing.build())
            }
            _ => missing.fail(),
        }
    }

    fn column(&self, field: &FieldConfig, storage_type: String) -> Column {
        Column {
            kind: ScalarKind::from_storage_type(&storage_type),
            storage_type,
            nullable: field.nullable,
            auto_increment: field.auto_increment,
            unique: field.unique,
        }
    }

    fn model_id(
        &self,
        model: &ModelConfig,
        field: &FieldConfig,
        name: &str,
    ) -> Result<usize, BuildError> {
        self.models.get(name).copied().context(UnknownModelSnafu {
            model: &model.name,
            field: &field.name,
            target: name,
        })
    }

    fn lookup(
        &self,
        model: &ModelConfig,
        field: &FieldConfig,
        reference: &Reference,
    ) -> Result<FieldId, BuildError> {
        let target = self.model_id(model, field, &reference.model)?;
        let index = self.fields[target]
            .get(reference.field.as_str())
            .copied()
            .context(UnknownFieldSnafu {
                model: &model.name,
                field: &field.name,
                target: reference.to_string(),
            })?;
        Ok(FieldId {
            model: ModelId(target),
            index,
        })
    }

    fn config_of(&self, id: FieldId) -> &'a FieldConfig {
        &self.config.models[id.model.0].fields[id.index]
    }

    fn qualified(&self, id: FieldId) -> String {
        format!(
            "{}.{}",
            self.config.models[id.model.0].name,
            self.config_of(id).name
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::blog_config;

    fn model(name: &str, fields: Vec<FieldConfig>) -> ModelConfig {
        ModelConfig {
            name: name.into(),
            plural_name: None,
            fields,
        }
    }

    fn domain(models: Vec<ModelConfig>) -> Result<Domain, BuildError> {
        Domain::new(DomainConfig { models })
    }

    #[test]
    fn test_blog_domain() {
        let domain = Domain::new(blog_config()).unwrap();
        let user = domain.model_by_name("User").unwrap();
        assert_eq!(user.plural_name, "users");
        assert_eq!(user.singular_name(), "user");
        assert_eq!(user.key_field().name, "id");

        let email = user.field("email").unwrap();
        assert!(domain.is_unique(email));
        assert!(!domain.is_unique(user.field("name").unwrap()));

        let posts = domain.relation(user.field("posts").unwrap()).unwrap();
        assert_eq!(posts.target.name, "Post");
        assert_eq!(posts.back_reference.name, "author");
        assert_eq!(posts.referenced.name, "id");
        assert!(!posts.is_unique());
        assert!(posts.through.is_none());

        let profile = domain.relation(user.field("profile").unwrap()).unwrap();
        assert!(profile.is_unique());

        let groups = domain.relation(user.field("groups").unwrap()).unwrap();
        assert_eq!(groups.target.name, "Membership");
        assert_eq!(groups.far.name, "Group");
        let through = groups.through.unwrap();
        assert_eq!(through.foreign_key.name, "group");
        assert_eq!(through.reverse.name, "memberships");
        assert!(!groups.is_unique());

        // Foreign keys inherit the storage type of the field they reference.
        let post = domain.model_by_name("Post").unwrap();
        let author = post.field("author").unwrap();
        assert_eq!(author.column().unwrap().kind, ScalarKind::Int);
        assert_eq!(domain.referenced(author).unwrap().name, "id");
    }

    #[test]
    fn test_scalar_kind() {
        for (ty, kind) in [
            ("varchar(32)", ScalarKind::String),
            ("TEXT", ScalarKind::String),
            ("integer", ScalarKind::Int),
            ("int8", ScalarKind::Int),
            ("bigint", ScalarKind::String),
            ("double precision", ScalarKind::Float),
            ("float", ScalarKind::Float),
            ("boolean", ScalarKind::Boolean),
            ("date", ScalarKind::String),
        ] {
            assert_eq!(ScalarKind::from_storage_type(ty), kind, "{ty}");
        }
    }

    #[test]
    fn test_empty_domain() {
        assert_eq!(domain(vec![]).unwrap_err(), BuildError::EmptyDomain);
    }

    #[test]
    fn test_missing_key() {
        let err = domain(vec![model("A", vec![FieldConfig::column("x", "int")])]).unwrap_err();
        assert_eq!(err, BuildError::MissingKey { model: "A".into() });
    }

    #[test]
    fn test_multiple_keys() {
        let err = domain(vec![model(
            "A",
            vec![
                FieldConfig::column("x", "int").key(),
                FieldConfig::column("y", "int").key(),
            ],
        )])
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::MultipleKeys {
                model: "A".into(),
                fields: vec!["x".into(), "y".into()]
            }
        );
    }

    #[test]
    fn test_duplicates() {
        let a = model("A", vec![FieldConfig::column("id", "int").key()]);
        assert_eq!(
            domain(vec![a.clone(), a]).unwrap_err(),
            BuildError::DuplicateModel { model: "A".into() }
        );

        let err = domain(vec![model(
            "A",
            vec![
                FieldConfig::column("id", "int").key(),
                FieldConfig::column("id", "text"),
            ],
        )])
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::DuplicateField {
                model: "A".into(),
                field: "id".into()
            }
        );
    }

    #[test]
    fn test_missing_type() {
        let err = domain(vec![model(
            "A",
            vec![
                FieldConfig::column("id", "int").key(),
                FieldConfig {
                    name: "x".into(),
                    ..Default::default()
                },
            ],
        )])
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingType {
                model: "A".into(),
                field: "x".into()
            }
        );
    }

    #[test]
    fn test_foreign_key_to_non_unique() {
        let err = domain(vec![
            model(
                "A",
                vec![
                    FieldConfig::column("id", "int").key(),
                    FieldConfig::column("x", "int"),
                ],
            ),
            model(
                "B",
                vec![
                    FieldConfig::column("id", "int").key(),
                    FieldConfig::foreign_key("a", "A", "x"),
                ],
            ),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::NotUnique {
                model: "B".into(),
                field: "a".into(),
                target: "A.x".into()
            }
        );
    }

    #[test]
    fn test_unknown_references() {
        let err = domain(vec![model(
            "A",
            vec![
                FieldConfig::column("id", "int").key(),
                FieldConfig::foreign_key("b", "B", "id"),
            ],
        )])
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownModel {
                model: "A".into(),
                field: "b".into(),
                target: "B".into()
            }
        );

        let err = domain(vec![model(
            "A",
            vec![
                FieldConfig::column("id", "int").key(),
                FieldConfig::related("children", "A", "parent"),
            ],
        )])
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownField {
                model: "A".into(),
                field: "children".into(),
                target: "A.parent".into()
            }
        );
    }

    #[test]
    fn test_bad_back_reference() {
        let a = model(
            "A",
            vec![
                FieldConfig::column("id", "int").key(),
                FieldConfig::related("bs", "B", "name"),
            ],
        );
        let b = model(
            "B",
            vec![
                FieldConfig::column("id", "int").key(),
                FieldConfig::column("name", "text"),
                FieldConfig::foreign_key("c", "C", "id"),
            ],
        );
        let c = model("C", vec![FieldConfig::column("id", "int").key()]);
        assert_eq!(
            domain(vec![a.clone(), b.clone(), c.clone()]).unwrap_err(),
            BuildError::NotForeignKey {
                model: "A".into(),
                field: "bs".into(),
                target: "B.name".into()
            }
        );

        let a = model(
            "A",
            vec![
                FieldConfig::column("id", "int").key(),
                FieldConfig::related("bs", "B", "c"),
            ],
        );
        assert_eq!(
            domain(vec![a, b, c]).unwrap_err(),
            BuildError::BackReferenceMismatch {
                model: "A".into(),
                field: "bs".into(),
                target: "B.c".into()
            }
        );
    }

    #[test]
    fn test_through_without_reverse() {
        let mut config = blog_config();
        let group = config
            .models
            .iter_mut()
            .find(|m| m.name == "Group")
            .unwrap();
        group.fields.retain(|f| f.name != "memberships");
        group.fields.retain(|f| f.name != "members");
        assert_eq!(
            Domain::new(config).unwrap_err(),
            BuildError::MissingThroughReverse {
                model: "User".into(),
                field: "groups".into(),
                target: "Group".into()
            }
        );
    }

    #[test]
    fn test_conflicting_field() {
        let mut field = FieldConfig::foreign_key("b", "A", "id");
        field.related = Some(Reference::new("A", "b"));
        let err = domain(vec![model(
            "A",
            vec![FieldConfig::column("id", "int").key(), field],
        )])
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::ConflictingField {
                model: "A".into(),
                field: "b".into()
            }
        );
    }

    #[test]
    fn test_relation_key_rejected() {
        let err = domain(vec![model(
            "A",
            vec![
                FieldConfig::column("id", "int"),
                FieldConfig::foreign_key("parent", "A", "id").key(),
            ],
        )])
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::InvalidKey {
                model: "A".into(),
                field: "parent".into()
            }
        );
    }
}
