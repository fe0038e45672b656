//! Decoding of resolver arguments into data source requests.

use crate::backend::{Filter, PageRequest, QueryOptions, Record};
use async_graphql::dynamic::indexmap::IndexMap;
use async_graphql::{Error, Name, Result, Value};

/// Raw arguments of a field, as provided by `ResolverContext::args`.
pub type Args = IndexMap<Name, Value>;

/// Convenience accessors for argument values.
pub trait ValueExt {
    /// The value as a non-negative count, or `None` if it is null.
    fn as_count(&self, name: &str) -> Result<Option<usize>>;
    /// The value as a list of strings.
    fn as_strings(&self, name: &str) -> Result<Vec<String>>;
    /// The value as an input object, or an empty object if it is null.
    fn as_record(&self, name: &str) -> Result<Record>;
}

impl ValueExt for Value {
    fn as_count(&self, name: &str) -> Result<Option<usize>> {
        match self {
            Value::Null => Ok(None),
            Value::Number(n) => match n.as_u64() {
                Some(n) => Ok(Some(n as usize)),
                None => Err(Error::new(format!("{name} must be a non-negative integer"))),
            },
            v => Err(Error::new(format!("{name} must be an integer, got {v}"))),
        }
    }

    fn as_strings(&self, name: &str) -> Result<Vec<String>> {
        match self {
            Value::Null => Ok(vec![]),
            Value::String(s) => Ok(vec![s.clone()]),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    v => Err(Error::new(format!("{name} must contain strings, got {v}"))),
                })
                .collect(),
            v => Err(Error::new(format!("{name} must be a list of strings, got {v}"))),
        }
    }

    fn as_record(&self, name: &str) -> Result<Record> {
        match self {
            Value::Null => Ok(Record::new()),
            Value::Object(fields) => Ok(fields.clone()),
            v => Err(Error::new(format!("{name} must be an object, got {v}"))),
        }
    }
}

fn arg<'a>(args: &'a Args, name: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    args.get(name).unwrap_or(&NULL)
}

/// Decode an input object argument; a missing argument decodes as an empty object.
pub fn record(args: &Args, name: &str) -> Result<Record> {
    arg(args, name).as_record(name)
}

/// Decode `{ where, limit, offset, orderBy }`.
pub fn query_options(args: &Args) -> Result<QueryOptions> {
    Ok(QueryOptions {
        filter: record(args, "where")?,
        limit: arg(args, "limit").as_count("limit")?,
        offset: arg(args, "offset").as_count("offset")?,
        order_by: arg(args, "orderBy").as_strings("orderBy")?,
    })
}

/// Decode `{ where, first, after, orderBy }`.
pub fn page_request(args: &Args) -> Result<PageRequest> {
    let cursor = match arg(args, "after") {
        Value::Null => None,
        Value::String(cursor) => Some(cursor.clone()),
        v => return Err(Error::new(format!("after must be a cursor string, got {v}"))),
    };
    Ok(PageRequest {
        filter: record(args, "where")?,
        order_by: arg(args, "orderBy").as_strings("orderBy")?,
        limit: arg(args, "first").as_count("first")?,
        cursor,
    })
}

/// Constrain `filter` with the clause `name: value`.
///
/// If the caller already constrained `name`, both clauses must hold.
pub fn inject(filter: &mut Filter, name: &str, value: Value) {
    match filter.get(name) {
        None | Some(Value::Null) => {
            filter.insert(Name::new(name), value);
        }
        Some(_) => {
            let clause = Value::Object(Filter::from_iter([(Name::new(name), value)]));
            let existing = Value::Object(std::mem::take(filter));
            filter.insert(Name::new("AND"), Value::List(vec![existing, clause]));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> Args {
        match Value::from_json(value).unwrap() {
            Value::Object(args) => args,
            _ => panic!("arguments must be an object"),
        }
    }

    #[test]
    fn test_query_options() {
        let options = query_options(&args(json!({
            "where": {"name": "Ada"},
            "limit": 10,
            "orderBy": ["-age", "name"],
        })))
        .unwrap();
        assert_eq!(options.filter, args(json!({"name": "Ada"})));
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.offset, None);
        assert_eq!(options.order_by, ["-age", "name"]);

        assert_eq!(query_options(&Args::new()).unwrap(), QueryOptions::default());
        query_options(&args(json!({"limit": -1}))).unwrap_err();
    }

    #[test]
    fn test_page_request() {
        let page = page_request(&args(json!({"first": 2, "after": "abc"}))).unwrap();
        assert_eq!(page.limit, Some(2));
        assert_eq!(page.cursor.as_deref(), Some("abc"));
        assert!(page.filter.is_empty());
    }

    #[test]
    fn test_inject() {
        let mut filter = args(json!({"title": "Hello"}));
        inject(&mut filter, "author", Value::from(1));
        assert_eq!(filter, args(json!({"title": "Hello", "author": 1})));

        let mut filter = args(json!({"author": 2}));
        inject(&mut filter, "author", Value::from(1));
        assert_eq!(filter, args(json!({"AND": [{"author": 2}, {"author": 1}]})));
    }
}
