//! Serializable description of a domain model.
//!
//! This is the form in which a domain is written down, typically as a JSON file. It is loosely
//! typed: fields are flat records of optional settings. [`Domain::new`](super::Domain::new)
//! checks a [`DomainConfig`] for consistency and resolves it into the strongly typed model used by
//! schema synthesis.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A complete domain: an ordered list of models.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    pub models: Vec<ModelConfig>,
}

/// A single entity type.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub name: String,
    /// Defaults to the model name with a lowercase first letter and a trailing `s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural_name: Option<String>,
    pub fields: Vec<FieldConfig>,
}

/// A field of a model.
///
/// The combination of settings determines what kind of field this is:
/// * `references` makes a foreign key to another model's unique field.
/// * `related` makes a virtual reverse relation, whose back-reference is the named foreign key.
/// * `related` together with `through` makes a many-to-many relation through a join model.
///   `related` names the join model's foreign key pointing back at this model, and `through` names
///   the join model's foreign key pointing at the far model.
/// * Otherwise, the field is a simple scalar column, and `type` is required.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    pub name: String,
    /// The storage type of the column, such as `varchar(64)` or `integer`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,
}

/// A reference to a field of some model, by name.
#[derive(Clone, Debug, PartialEq, Eq, Display, Deserialize, Serialize)]
#[display(fmt = "{}.{}", model, field)]
pub struct Reference {
    pub model: String,
    pub field: String,
}

impl Reference {
    pub fn new(model: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            field: field.into(),
        }
    }
}

impl FieldConfig {
    /// A simple column with the given storage type.
    pub fn column(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: Some(column_type.into()),
            ..Default::default()
        }
    }

    /// A foreign key referencing `model.field`.
    pub fn foreign_key(
        name: impl Into<String>,
        model: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            references: Some(Reference::new(model, field)),
            ..Default::default()
        }
    }

    /// The reverse of the foreign key `model.field`.
    pub fn related(
        name: impl Into<String>,
        model: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            related: Some(Reference::new(model, field)),
            ..Default::default()
        }
    }

    /// Mark this field as the key of its model.
    pub fn key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Route this relation through the join model's foreign key `through`.
    pub fn through(mut self, through: impl Into<String>) -> Self {
        self.through = Some(through.into());
        self
    }
}
