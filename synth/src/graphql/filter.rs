//! Filter and lookup input types.
//!
//! Every model gets a filter type, `Filter<Model>Input`, and a lookup type, `Find<Model>Input`.
//! The filter type offers, for each scalar field `f`, an equality test `f` and the operator
//! fields `f_<op>` described by [`Operator`]. Foreign keys filter by the referenced record, and
//! each relation `r` adds `r_some` and `r_none`, which quantify over the related records using a
//! filter type specific to the relation. `AND`, `OR` and `NOT` combine filters of the same type.
//!
//! The lookup type only admits unique fields, so a lookup can never be ambiguous.

use super::{
    names,
    registry::{Builder, Fields},
    scalar,
};
use crate::{
    domain::{FieldKind, ScalarKind},
    error::BuildError,
};
use async_graphql::dynamic::TypeRef;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

pub const AND: &str = "AND";
pub const OR: &str = "OR";
pub const NOT: &str = "NOT";

/// A comparison applied to a scalar field, selected by the suffix of a filter field name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Operator {
    Lt,
    Le,
    Ge,
    Gt,
    Ne,
    /// Tests whether the field is null (`true`) or not (`false`).
    Null,
    /// Tests whether the field equals any value in a list.
    In,
    /// SQL-style pattern match, only offered for string fields.
    Like,
}

impl Operator {
    /// The type of the filter field applying this operator to a field of the given kind, if the
    /// operator applies to such fields at all.
    pub fn input_type(&self, kind: ScalarKind) -> Option<TypeRef> {
        match self {
            Self::Lt | Self::Le | Self::Ge | Self::Gt | Self::Ne => Some(scalar(kind)),
            Self::Null => Some(TypeRef::named(TypeRef::BOOLEAN)),
            Self::In => Some(TypeRef::named_list(kind.to_string())),
            Self::Like if kind == ScalarKind::String => Some(scalar(kind)),
            Self::Like => None,
        }
    }

    pub fn suffixed(&self, field: &str) -> String {
        format!("{field}_{self}")
    }
}

/// A quantifier over the records related to a record through a relation field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Quantifier {
    Some,
    None,
}

impl Quantifier {
    pub fn suffixed(&self, field: &str) -> String {
        format!("{field}_{self}")
    }
}

/// Generate filter and lookup types for every model.
///
/// This runs in three passes, since later passes refer to the types created by earlier ones:
/// scalar fields, then foreign keys, then relations.
pub fn synthesize(b: &mut Builder) -> Result<(), BuildError> {
    let domain = b.domain;

    for model in domain.models() {
        let filter = b.registry.input(names::filter(&model.name))?;
        let lookup = b.registry.input(names::find(model))?;
        for field in &model.fields {
            let FieldKind::Simple(column) = &field.kind else {
                continue;
            };
            let ty = scalar(column.kind);
            let fields = b.registry.input_fields(filter);
            fields.insert(field.name.clone(), ty.clone());
            for op in Operator::iter() {
                if let Some(op_ty) = op.input_type(column.kind) {
                    fields.insert(op.suffixed(&field.name), op_ty);
                }
            }
            if domain.is_unique(field) {
                b.registry.input_fields(lookup).insert(field.name.clone(), ty);
            }
        }

        let combined = b.registry.named_list(filter);
        let fields = b.registry.input_fields(filter);
        for op in [AND, OR, NOT] {
            fields.insert(op.into(), combined.clone());
        }

        b.filters.push(filter);
        b.lookups.push(lookup);
    }

    for model in domain.models() {
        for field in &model.fields {
            let Some(referenced) = domain.referenced(field) else {
                continue;
            };
            let target = referenced.model().0;
            let ty = b.registry.named(b.filters[target]);
            b.registry
                .input_fields(b.filters[model.id.0])
                .insert(field.name.clone(), ty);
            if domain.is_unique(field) {
                let ty = b.registry.named(b.lookups[target]);
                b.registry
                    .input_fields(b.lookups[model.id.0])
                    .insert(field.name.clone(), ty);
            }
        }
    }

    for model in domain.models() {
        for relation in domain.relations(model) {
            // The back-reference is excluded: every related record trivially refers back here.
            let name = names::filter(&names::relation(model, relation.field));
            let handle = b.registry.input(name)?;
            let combined = b.registry.named_list(handle);
            let mut fields = Fields::derived(
                b.filters[relation.target.id.0],
                &relation.back_reference.name,
            );
            for op in [AND, OR, NOT] {
                fields = fields.with(op, combined.clone());
            }
            b.registry.set_input(handle, fields);
            b.relation_filters.insert(relation.field.id, handle);

            let ty = b.registry.named(handle);
            let filter = b.registry.input_fields(b.filters[model.id.0]);
            for quantifier in Quantifier::iter() {
                filter.insert(quantifier.suffixed(&relation.field.name), ty.clone());
            }
        }
    }

    Ok(())
}
