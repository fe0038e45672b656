//! Synthesis of a relational GraphQL API from a domain model.
//!
//! Given a [`Domain`](domain::Domain) describing entity types, their scalar columns, foreign keys
//! and reverse relations, [`build_schema`](graphql::build_schema) produces a complete GraphQL
//! schema: per-model filter algebras, readable object types which can traverse relations,
//! cursor-paginated connections, and nested create/update/upsert inputs which can write a whole
//! object graph in one request. Every generated resolver delegates to a
//! [`DataSource`](backend::DataSource) supplied with each request.

pub mod backend;
pub mod domain;
pub mod error;
pub mod graphql;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use graphql::build_schema;

use tracing_subscriber::EnvFilter;

/// Install a global logger which writes to standard error, filtered by `RUST_LOG`.
///
/// Calling this more than once is harmless; only the first call installs a logger.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
