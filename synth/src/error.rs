//! Errors reported while building a schema.

use snafu::Snafu;

/// A malformed domain model, or a conflict discovered while assembling the generated schema.
///
/// Schema construction is all-or-nothing: any of these aborts the build and no schema is
/// returned.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BuildError {
    #[snafu(display("domain model defines no models"))]
    EmptyDomain,

    #[snafu(display("model {model} is defined more than once"))]
    DuplicateModel { model: String },

    #[snafu(display("model {model} defines field {field} more than once"))]
    DuplicateField { model: String, field: String },

    #[snafu(display("model {model} has no key field"))]
    MissingKey { model: String },

    #[snafu(display("model {model} has more than one key field ({fields:?})"))]
    MultipleKeys { model: String, fields: Vec<String> },

    #[snafu(display("key field {model}.{field} must be a simple column"))]
    InvalidKey { model: String, field: String },

    #[snafu(display("field {model}.{field} mixes foreign key and relation settings"))]
    ConflictingField { model: String, field: String },

    #[snafu(display("field {model}.{field} has no storage type"))]
    MissingType { model: String, field: String },

    #[snafu(display("field {model}.{field} refers to unknown model {target}"))]
    UnknownModel {
        model: String,
        field: String,
        target: String,
    },

    #[snafu(display("field {model}.{field} refers to unknown field {target}"))]
    UnknownField {
        model: String,
        field: String,
        target: String,
    },

    #[snafu(display("foreign key {model}.{field} references {target}, which is not a unique column"))]
    NotUnique {
        model: String,
        field: String,
        target: String,
    },

    #[snafu(display("field {model}.{field} relies on {target}, which is not a foreign key"))]
    NotForeignKey {
        model: String,
        field: String,
        target: String,
    },

    #[snafu(display("relation {model}.{field}: back-reference {target} does not reference {model}"))]
    BackReferenceMismatch {
        model: String,
        field: String,
        target: String,
    },

    #[snafu(display(
        "relation {model}.{field}: model {target} has no direct relation back to the join model"
    ))]
    MissingThroughReverse {
        model: String,
        field: String,
        target: String,
    },

    #[snafu(display("generated type name {name} is used more than once"))]
    DuplicateType { name: String },

    #[snafu(display("generated {parent} field {name} is used more than once"))]
    DuplicateOperation { parent: String, name: String },

    #[snafu(display("invalid schema: {message}"))]
    Schema { message: String },
}
