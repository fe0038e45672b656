//! Synthesis of a GraphQL schema from a [`Domain`](crate::domain::Domain).
//!
//! Schema construction runs a fixed sequence of passes over a shared
//! [`Builder`](registry::Builder), each pass consuming the types generated by the ones before:
//!
//! 1. [`filter`] generates filter and lookup input types.
//! 2. [`object`] generates object types, relation object types and paginated connections.
//! 3. [`mutation`] generates create, update and upsert inputs, including nested relation inputs.
//! 4. [`fields`] generates the fields of the `Query` and `Mutation` root types.
//!
//! [`build_schema`] then materializes every registered type into an executable
//! [`Schema`](async_graphql::dynamic::Schema). Resolvers delegate all data access to the
//! [`Accessor`](crate::backend::Accessor) attached to each request.

use crate::domain::ScalarKind;
use async_graphql::dynamic::TypeRef;

pub mod args;
pub mod fields;
pub mod filter;
pub mod mutation;
pub mod names;
pub mod object;
pub mod registry;
pub mod schema;

pub use schema::build_schema;

/// The GraphQL scalar type for a column of the given kind.
pub fn scalar(kind: ScalarKind) -> TypeRef {
    TypeRef::named(kind.to_string())
}
