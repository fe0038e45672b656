//! Interface provided by a backend data source consumed by the generated GraphQL API.
//!
//! The entrypoint is [`DataSource`], which describes every interaction between the generated
//! resolvers and storage. Resolvers never touch storage directly; each one shapes its arguments
//! and delegates to exactly one [`DataSource`] operation. The data source for a request is
//! attached to the request as context data of type [`Accessor`], so one schema can serve many
//! backends, and per-request state such as a load cache belongs to the data source.
//!
//! Records and filters are exchanged as maps of GraphQL [`Value`]s keyed by field name. A record
//! holds the stored columns of a model; a foreign key column holds the raw value of the field it
//! references. A filter is an object of the shape of the model's generated filter input type:
//! plain field names compare for equality, `<field>_<op>` names apply a comparison operator,
//! `<relation>_some` and `<relation>_none` quantify over related records, and `AND`, `OR` and
//! `NOT` combine sub-filters.

use crate::domain::{Field, Model};
use async_graphql::dynamic::indexmap::IndexMap;
use async_graphql::{Name, Value};
use async_std::sync::Arc;
use async_trait::async_trait;
use derive_more::From;
use snafu::Snafu;
use std::fmt::Display;

pub mod mock;

/// A record of a model, keyed by field name.
pub type Record = IndexMap<Name, Value>;

/// A filter over records of a model, keyed by filter field name.
pub type Filter = IndexMap<Name, Value>;

/// Errors reported by a data source.
#[derive(Clone, Debug, Snafu, From)]
#[snafu(display("{}", message))]
pub struct Error {
    message: String,
}

impl Error {
    /// Wrap a custom message into an error.
    pub fn custom(msg: impl Display) -> Self {
        Self {
            message: msg.to_string(),
        }
    }
}

/// Options for a list query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    /// Only include records matching this filter.
    pub filter: Filter,
    /// Limit the results to the first N records that otherwise match the request.
    pub limit: Option<usize>,
    /// Skip this many records before collecting results.
    pub offset: Option<usize>,
    /// Sort keys, most significant first.
    ///
    /// Each key is a field name, optionally prefixed with `-` to sort in descending order.
    pub order_by: Vec<String>,
}

/// A specification of a page to load from a cursor-paginated collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageRequest {
    /// Only include records matching this filter.
    pub filter: Filter,
    /// Sort keys, in the format of [`QueryOptions::order_by`].
    pub order_by: Vec<String>,
    /// The size of the page.
    ///
    /// The data source returns up to one record more than this, so that the caller can tell
    /// whether another page follows.
    pub limit: Option<usize>,
    /// Start the page at the first record after the one indicated by this cursor.
    pub cursor: Option<String>,
}

/// A record loaded from a cursor-paginated collection, with its position in the collection.
#[derive(Clone, Debug, PartialEq)]
pub struct CursorEdge {
    pub node: Record,
    pub cursor: String,
}

/// A source of data which can be served by the generated GraphQL API.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Load the record of `field`'s model whose `field` equals `key`.
    ///
    /// `field` must be unique. Within a single request, concurrent loads of the same key should be
    /// coalesced into a single fetch.
    async fn load(&self, field: &Field, key: Value) -> Result<Option<Record>, Error>;

    /// Load all records of `model` matching `options`.
    async fn query(&self, model: &Model, options: QueryOptions) -> Result<Vec<Record>, Error>;

    /// Load the single record of `model` identified by the unique fields in `filter`.
    async fn get(&self, model: &Model, filter: Filter) -> Result<Option<Record>, Error>;

    /// Create a record of `model`, along with any nested records described in `data`.
    async fn create(&self, model: &Model, data: Record) -> Result<Record, Error>;

    /// Update the record of `model` identified by `filter`.
    async fn update(&self, model: &Model, data: Record, filter: Filter) -> Result<Record, Error>;

    /// Update the record of `model` identified by the unique fields of `create`, or create it if
    /// it does not exist.
    async fn upsert(&self, model: &Model, create: Record, update: Record)
        -> Result<Record, Error>;

    /// Delete the record of `model` identified by `filter`, returning it.
    async fn delete(&self, model: &Model, filter: Filter) -> Result<Record, Error>;

    /// Load a page of records of `model`.
    ///
    /// At most `page.limit + 1` edges are returned, in the order given by `page.order_by`.
    async fn cursor_query(&self, model: &Model, page: PageRequest)
        -> Result<Vec<CursorEdge>, Error>;
}

/// The data source serving a request.
///
/// Attach one to each request with [`Request::data`](async_graphql::Request::data).
pub type Accessor = Arc<dyn DataSource>;
