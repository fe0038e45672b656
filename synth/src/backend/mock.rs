//! Mock instantiation of the [`DataSource`](super::DataSource) interface.
//!
//! This instantiation is built on a simple in-memory database with one table per model. It
//! evaluates the complete filter algebra and nested mutation inputs of the generated API, and it
//! records every call made to it, so it is useful for testing resolvers in isolation from an
//! actual database.
#![cfg(any(test, feature = "testing"))]

use super::{CursorEdge, DataSource, Error, Filter, PageRequest, QueryOptions, Record};
use crate::domain::{Domain, Field, FieldId, FieldKind, Model, Relation};
use crate::graphql::filter::{Operator, Quantifier, AND, NOT, OR};
use async_graphql::{Name, Value};
use async_std::sync::{Arc, Mutex, RwLock};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

static NULL: Value = Value::Null;

/// A call made to the data source.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Load {
        model: String,
        field: String,
        key: Value,
    },
    /// A database read made by a `load` which missed the cache.
    Fetch {
        model: String,
        field: String,
        key: Value,
    },
    Query {
        model: String,
    },
    Get {
        model: String,
    },
    Create {
        model: String,
    },
    Update {
        model: String,
    },
    Upsert {
        model: String,
    },
    Delete {
        model: String,
    },
    CursorQuery {
        model: String,
    },
    /// A row written to a table, either directly or by a nested mutation.
    Insert {
        model: String,
        record: Record,
    },
}

/// The in-memory database.
#[derive(Debug, Default)]
struct Db {
    /// Rows of each model, indexed by model ID.
    tables: Vec<Vec<Record>>,
}

/// An in-memory [`DataSource`](super::DataSource).
///
/// Clones share the same database, call log and load cache.
#[derive(Clone, Debug)]
pub struct MockDataSource {
    domain: Arc<Domain>,
    db: Arc<RwLock<Db>>,
    calls: Arc<Mutex<Vec<Call>>>,
    cache: Arc<Mutex<HashMap<(FieldId, String), Option<Record>>>>,
}

impl MockDataSource {
    /// Create a fresh, empty database for `domain`.
    pub fn new(domain: Domain) -> Self {
        let db = Db {
            tables: vec![vec![]; domain.models().len()],
        };
        Self {
            domain: Arc::new(domain),
            db: Arc::new(RwLock::new(db)),
            calls: Default::default(),
            cache: Default::default(),
        }
    }

    /// Append rows to the table for `model`, bypassing all checks.
    ///
    /// Each row is a JSON object mapping field names to stored values.
    pub async fn seed(
        &self,
        model: &str,
        rows: impl IntoIterator<Item = serde_json::Value>,
    ) -> Result<(), Error> {
        let model = self.model(model)?;
        let mut records = vec![];
        for row in rows {
            match Value::from_json(row).map_err(Error::custom)? {
                Value::Object(record) => records.push(record),
                row => return Err(Error::custom(format!("row {row} is not an object"))),
            }
        }
        self.db.write().await.tables[model.id.0].extend(records);
        self.cache.lock().await.clear();
        Ok(())
    }

    /// All rows currently stored for `model`.
    pub async fn rows(&self, model: &str) -> Result<Vec<Record>, Error> {
        let model = self.model(model)?;
        Ok(self.db.read().await.tables[model.id.0].clone())
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    fn model(&self, name: &str) -> Result<&Model, Error> {
        self.domain
            .model_by_name(name)
            .ok_or_else(|| Error::custom(format!("no such model {name}")))
    }

    async fn log(&self, call: Call) {
        tracing::debug!(?call, "mock data source call");
        self.calls.lock().await.push(call);
    }

    /// Run a mutation against the database.
    ///
    /// The mutation is atomic: if it fails, none of its writes, nested ones included, are kept.
    async fn write<T>(
        &self,
        f: impl FnOnce(&mut Writer) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut db = self.db.write().await;
        let snapshot = db.tables.clone();
        let mut writer = Writer {
            domain: &self.domain,
            db: &mut db,
            log: vec![],
        };
        let res = f(&mut writer);
        let log = writer.log;
        if let Err(err) = &res {
            tracing::debug!(%err, "mutation failed, rolling back");
            db.tables = snapshot;
            return res;
        }
        drop(db);

        self.cache.lock().await.clear();
        self.calls.lock().await.extend(log);
        res
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn load(&self, field: &Field, key: Value) -> Result<Option<Record>, Error> {
        let model = self.domain.model(field.model());
        self.log(Call::Load {
            model: model.name.clone(),
            field: field.name.clone(),
            key: key.clone(),
        })
        .await;

        // Holding the cache across the miss makes concurrent loads of one key share a fetch.
        let cache_key = (field.id, key.to_string());
        let mut cache = self.cache.lock().await;
        if let Some(record) = cache.get(&cache_key) {
            return Ok(record.clone());
        }
        self.log(Call::Fetch {
            model: model.name.clone(),
            field: field.name.clone(),
            key: key.clone(),
        })
        .await;
        let record = self.db.read().await.tables[model.id.0]
            .iter()
            .find(|row| column(row, &field.name) == &key)
            .cloned();
        cache.insert(cache_key, record.clone());
        Ok(record)
    }

    async fn query(&self, model: &Model, options: QueryOptions) -> Result<Vec<Record>, Error> {
        self.log(Call::Query {
            model: model.name.clone(),
        })
        .await;
        let db = self.db.read().await;
        let rows = Store::new(&self.domain, &db).select(model, &options.filter, &options.order_by)?;
        Ok(rows
            .into_iter()
            .skip(options.offset.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get(&self, model: &Model, filter: Filter) -> Result<Option<Record>, Error> {
        self.log(Call::Get {
            model: model.name.clone(),
        })
        .await;
        let db = self.db.read().await;
        Ok(Store::new(&self.domain, &db)
            .find(model, &filter)?
            .map(|i| db.tables[model.id.0][i].clone()))
    }

    async fn create(&self, model: &Model, data: Record) -> Result<Record, Error> {
        self.log(Call::Create {
            model: model.name.clone(),
        })
        .await;
        self.write(|w| w.create(model, &data)).await
    }

    async fn update(&self, model: &Model, data: Record, filter: Filter) -> Result<Record, Error> {
        self.log(Call::Update {
            model: model.name.clone(),
        })
        .await;
        self.write(|w| w.update(model, &data, &filter)).await
    }

    async fn upsert(
        &self,
        model: &Model,
        create: Record,
        update: Record,
    ) -> Result<Record, Error> {
        self.log(Call::Upsert {
            model: model.name.clone(),
        })
        .await;
        self.write(|w| w.upsert(model, &create, &update)).await
    }

    async fn delete(&self, model: &Model, filter: Filter) -> Result<Record, Error> {
        self.log(Call::Delete {
            model: model.name.clone(),
        })
        .await;
        self.write(|w| w.delete(model, &filter)).await
    }

    async fn cursor_query(
        &self,
        model: &Model,
        page: PageRequest,
    ) -> Result<Vec<CursorEdge>, Error> {
        self.log(Call::CursorQuery {
            model: model.name.clone(),
        })
        .await;
        let start = match &page.cursor {
            Some(cursor) => decode_cursor(cursor)? + 1,
            None => 0,
        };
        let db = self.db.read().await;
        let rows = Store::new(&self.domain, &db).select(model, &page.filter, &page.order_by)?;
        Ok(rows
            .into_iter()
            .enumerate()
            .skip(start)
            .take(page.limit.map(|l| l + 1).unwrap_or(usize::MAX))
            .map(|(i, row)| CursorEdge {
                node: row.clone(),
                cursor: encode_cursor(i),
            })
            .collect())
    }
}

fn encode_cursor(index: usize) -> String {
    STANDARD.encode(format!("cursor:{index}"))
}

fn decode_cursor(cursor: &str) -> Result<usize, Error> {
    let invalid = || Error::custom(format!("invalid cursor {cursor}"));
    let bytes = STANDARD.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix("cursor:")
        .and_then(|index| index.parse().ok())
        .ok_or_else(invalid)
}

fn column<'a>(record: &'a Record, name: &str) -> &'a Value {
    record.get(name).unwrap_or(&NULL)
}

/// Read access to a snapshot of the database.
struct Store<'a> {
    domain: &'a Domain,
    db: &'a Db,
}

impl<'a> Store<'a> {
    fn new(domain: &'a Domain, db: &'a Db) -> Self {
        Self { domain, db }
    }

    /// All rows of `model` matching `filter`, sorted by `order_by`.
    fn select(
        &self,
        model: &Model,
        filter: &Filter,
        order_by: &[String],
    ) -> Result<Vec<&'a Record>, Error> {
        let mut rows = vec![];
        for row in &self.db.tables[model.id.0] {
            if self.matches(model, row, filter)? {
                rows.push(row);
            }
        }
        for key in order_by {
            let name = key.strip_prefix('-').unwrap_or(key);
            if model.field(name).and_then(Field::column).is_none() {
                return Err(Error::custom(format!(
                    "cannot order {} by {name}",
                    model.name
                )));
            }
        }
        rows.sort_by(|l, r| {
            order_by
                .iter()
                .map(|key| match key.strip_prefix('-') {
                    Some(name) => compare(column(r, name), column(l, name)),
                    None => compare(column(l, key), column(r, key)),
                })
                .map(|ord| ord.unwrap_or(Ordering::Equal))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(rows)
    }

    /// The position of the unique row of `model` matching `filter`.
    fn find(&self, model: &Model, filter: &Filter) -> Result<Option<usize>, Error> {
        for (i, row) in self.db.tables[model.id.0].iter().enumerate() {
            if self.matches(model, row, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn matches(&self, model: &Model, row: &Record, filter: &Filter) -> Result<bool, Error> {
        for (key, value) in filter {
            if !self.test(model, row, key, value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn test(&self, model: &Model, row: &Record, key: &str, value: &Value) -> Result<bool, Error> {
        match key {
            AND => {
                for filter in sub_filters(value)? {
                    if !self.matches(model, row, filter)? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            OR => {
                for filter in sub_filters(value)? {
                    if self.matches(model, row, filter)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            NOT => {
                for filter in sub_filters(value)? {
                    if self.matches(model, row, filter)? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            _ => {}
        }

        if let Some(field) = model.field(key) {
            return match (&field.kind, value) {
                (FieldKind::ForeignKey { references, .. }, Value::Object(filter)) => {
                    let referenced = self.domain.field(*references);
                    let parent = self.domain.model(referenced.model());
                    let key = column(row, &field.name);
                    match self.db.tables[parent.id.0]
                        .iter()
                        .find(|r| column(r, &referenced.name) == key)
                    {
                        Some(parent_row) => self.matches(parent, parent_row, filter),
                        None => Ok(false),
                    }
                }
                (FieldKind::Related { .. }, _) => {
                    self.quantify(model, row, field, Quantifier::Some, value)
                }
                _ => Ok(column(row, key) == value),
            };
        }

        let unknown = || Error::custom(format!("unknown filter field {}.{key}", model.name));
        let (name, op) = key.rsplit_once('_').ok_or_else(unknown)?;
        let field = model.field(name).ok_or_else(unknown)?;
        if let Ok(quantifier) = Quantifier::from_str(op) {
            return self.quantify(model, row, field, quantifier, value);
        }
        let op = Operator::from_str(op).map_err(|_| unknown())?;
        if *value == Value::Null && op != Operator::Null {
            return Ok(true);
        }

        let col = column(row, name);
        // Null columns satisfy no ordering comparison.
        let ord = match col {
            Value::Null => None,
            col => compare(col, value),
        };
        Ok(match op {
            Operator::Lt => ord == Some(Ordering::Less),
            Operator::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            Operator::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
            Operator::Gt => ord == Some(Ordering::Greater),
            Operator::Ne => col != value,
            Operator::Null => (*col == Value::Null) == (*value == Value::Boolean(true)),
            Operator::In => match value {
                Value::List(items) => items.contains(col),
                _ => return Err(Error::custom(format!("{key} expects a list"))),
            },
            Operator::Like => match (col, value) {
                (Value::String(text), Value::String(pattern)) => like(
                    &pattern.chars().collect::<Vec<_>>(),
                    &text.chars().collect::<Vec<_>>(),
                ),
                _ => false,
            },
        })
    }

    /// Test whether some or none of the records related to `row` through `field` match `value`.
    ///
    /// The sub-filter applies to records of the model owning the relation's back-reference.
    fn quantify(
        &self,
        model: &Model,
        row: &Record,
        field: &Field,
        quantifier: Quantifier,
        value: &Value,
    ) -> Result<bool, Error> {
        let relation = self
            .domain
            .relation(field)
            .ok_or_else(|| Error::custom(format!("{}.{} is not a relation", model.name, field.name)))?;
        let Value::Object(filter) = value else {
            return Err(Error::custom(format!("{} expects an object", field.name)));
        };
        let key = column(row, &relation.referenced.name);
        let mut found = false;
        for child in &self.db.tables[relation.target.id.0] {
            if column(child, &relation.back_reference.name) == key
                && self.matches(relation.target, child, filter)?
            {
                found = true;
                break;
            }
        }
        Ok(match quantifier {
            Quantifier::Some => found,
            Quantifier::None => !found,
        })
    }
}

fn sub_filters(value: &Value) -> Result<Vec<&Filter>, Error> {
    match value {
        Value::Object(filter) => Ok(vec![filter]),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(filter) => Ok(filter),
                item => Err(Error::custom(format!("expected a filter, got {item}"))),
            })
            .collect(),
        Value::Null => Ok(vec![]),
        value => Err(Error::custom(format!("expected a filter, got {value}"))),
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Boolean(l), Value::Boolean(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        _ => None,
    }
}

/// SQL `LIKE` matching: `%` matches any sequence and `_` any single character.
fn like(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|i| like(rest, &text[i..])),
        Some(('_', rest)) => !text.is_empty() && like(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && like(rest, &text[1..]),
    }
}

/// A single mutation of the database, including any nested mutations.
struct Writer<'a> {
    domain: &'a Domain,
    db: &'a mut Db,
    log: Vec<Call>,
}

impl<'a> Writer<'a> {
    fn store(&self) -> Store<'_> {
        Store::new(self.domain, &*self.db)
    }

    fn find(&self, model: &Model, filter: &Filter) -> Result<usize, Error> {
        self.store().find(model, filter)?.ok_or_else(|| {
            Error::custom(format!(
                "no {} matches {}",
                model.name,
                Value::Object(filter.clone())
            ))
        })
    }

    fn position(&self, model: &Model, key: &Value) -> Result<usize, Error> {
        let name = &model.key_field().name;
        self.db.tables[model.id.0]
            .iter()
            .position(|row| column(row, name) == key)
            .ok_or_else(|| Error::custom(format!("no {} with {name} {key}", model.name)))
    }

    fn create(&mut self, model: &Model, data: &Record) -> Result<Record, Error> {
        let mut row = Record::new();
        for field in &model.fields {
            let value = column(data, &field.name);
            match &field.kind {
                FieldKind::Simple(col) => {
                    let value = if *value == Value::Null && col.auto_increment {
                        self.next_id(model, field)
                    } else {
                        value.clone()
                    };
                    row.insert(Name::new(&field.name), value);
                }
                FieldKind::ForeignKey { references, .. } => {
                    let value = match value {
                        Value::Object(payload) => self.parent(*references, payload)?,
                        value => value.clone(),
                    };
                    row.insert(Name::new(&field.name), value);
                }
                FieldKind::Related { .. } => {}
            }
        }
        self.check_unique(model, &row, None)?;
        self.db.tables[model.id.0].push(row.clone());
        self.log.push(Call::Insert {
            model: model.name.clone(),
            record: row.clone(),
        });

        let key = column(&row, &model.key_field().name).clone();
        self.children(model, &key, data)?;
        Ok(self.db.tables[model.id.0][self.position(model, &key)?].clone())
    }

    fn update(&mut self, model: &Model, data: &Record, filter: &Filter) -> Result<Record, Error> {
        let index = self.find(model, filter)?;
        let mut row = self.db.tables[model.id.0][index].clone();
        for field in &model.fields {
            let Some(value) = data.get(field.name.as_str()) else {
                continue;
            };
            match &field.kind {
                FieldKind::Simple(_) => {
                    row.insert(Name::new(&field.name), value.clone());
                }
                FieldKind::ForeignKey { references, .. } => {
                    let value = match value {
                        Value::Object(payload) => {
                            self.update_parent(*references, column(&row, &field.name), payload)?
                        }
                        value => value.clone(),
                    };
                    row.insert(Name::new(&field.name), value);
                }
                FieldKind::Related { .. } => {}
            }
        }
        self.check_unique(model, &row, Some(index))?;
        self.db.tables[model.id.0][index] = row.clone();
        self.log.push(Call::Insert {
            model: model.name.clone(),
            record: row.clone(),
        });

        let key = column(&row, &model.key_field().name).clone();
        self.children(model, &key, data)?;
        Ok(self.db.tables[model.id.0][self.position(model, &key)?].clone())
    }

    fn upsert(&mut self, model: &Model, create: &Record, update: &Record) -> Result<Record, Error> {
        let mut filter = Filter::new();
        for field in &model.fields {
            if !self.domain.is_unique(field) {
                continue;
            }
            match create.get(field.name.as_str()) {
                Some(Value::Null | Value::Object(_)) | None => {}
                Some(value) => {
                    filter.insert(Name::new(&field.name), value.clone());
                }
            }
        }
        let existing = if filter.is_empty() {
            None
        } else {
            let key = &model.key_field().name;
            self.store()
                .find(model, &Filter::from_iter([(Name::new("OR"), or_filter(filter))]))?
                .map(|i| column(&self.db.tables[model.id.0][i], key).clone())
        };
        match existing {
            Some(key) => {
                let filter = Filter::from_iter([(Name::new(&model.key_field().name), key)]);
                self.update(model, update, &filter)
            }
            None => self.create(model, create),
        }
    }

    fn delete(&mut self, model: &Model, filter: &Filter) -> Result<Record, Error> {
        let index = self.find(model, filter)?;
        Ok(self.db.tables[model.id.0].remove(index))
    }

    /// Resolve a nested parent payload of a create input, returning the value for the foreign key.
    fn parent(&mut self, references: FieldId, payload: &Record) -> Result<Value, Error> {
        self.update_parent(references, &NULL, payload)
    }

    /// Resolve a nested parent payload of an update input, returning the value for the foreign
    /// key, whose current value is `current`.
    fn update_parent(
        &mut self,
        references: FieldId,
        current: &Value,
        payload: &Record,
    ) -> Result<Value, Error> {
        let referenced = self.domain.field(references);
        let parent = self.domain.model(referenced.model());
        let mut value = current.clone();
        if let Some(Value::Object(filter)) = payload.get("connect") {
            let index = self.find(parent, filter)?;
            value = column(&self.db.tables[parent.id.0][index], &referenced.name).clone();
        }
        if let Some(Value::Object(data)) = payload.get("create") {
            value = column(&self.create(parent, data)?, &referenced.name).clone();
        }
        if let Some(Value::Object(upsert)) = payload.get("upsert") {
            let (create, update) = upsert_args(upsert);
            value = column(&self.upsert(parent, &create, &update)?, &referenced.name).clone();
        }
        if let Some(Value::Object(data)) = payload.get("update") {
            let filter = Filter::from_iter([(Name::new(&referenced.name), value.clone())]);
            value = column(&self.update(parent, data, &filter)?, &referenced.name).clone();
        }
        Ok(value)
    }

    /// Apply the nested relation payloads in `data` to the children of a record of `model`.
    fn children(&mut self, model: &Model, key: &Value, data: &Record) -> Result<(), Error> {
        let domain = self.domain;
        let index = self.position(model, key)?;
        let parent = self.db.tables[model.id.0][index].clone();
        for relation in domain.relations(model) {
            if let Some(Value::Object(payload)) = data.get(relation.field.name.as_str()) {
                let value = column(&parent, &relation.referenced.name).clone();
                if relation.through.is_some() {
                    self.through_children(relation, &value, payload)?;
                } else {
                    self.direct_children(relation, &value, payload)?;
                }
            }
        }
        Ok(())
    }

    fn direct_children(
        &mut self,
        relation: Relation,
        parent: &Value,
        payload: &Record,
    ) -> Result<(), Error> {
        let target = relation.target;
        let back = Name::new(&relation.back_reference.name);
        let linked = |filter: &Record| {
            let mut filter = filter.clone();
            filter.insert(back.clone(), parent.clone());
            filter
        };

        for filter in items(payload, "connect") {
            let index = self.find(target, filter)?;
            self.set(target, index, &back, parent.clone());
        }
        for data in items(payload, "create") {
            self.create(target, &linked(data))?;
        }
        for upsert in items(payload, "upsert") {
            let (create, update) = upsert_args(upsert);
            self.upsert(target, &linked(&create), &update)?;
        }
        if relation.is_unique() {
            if let Some(Value::Object(data)) = payload.get("update") {
                self.update(target, data, &linked(&Filter::new()))?;
            }
        } else {
            for update in items(payload, "update") {
                let filter = match update.get("where") {
                    Some(Value::Object(filter)) => linked(filter),
                    _ => linked(&Filter::new()),
                };
                let data = match update.get("data") {
                    Some(Value::Object(data)) => data.clone(),
                    _ => Record::new(),
                };
                self.update(target, &data, &filter)?;
            }
        }
        for filter in items(payload, "delete") {
            self.delete(target, &linked(filter))?;
        }
        for filter in items(payload, "disconnect") {
            let index = self.find(target, &linked(filter))?;
            self.set(target, index, &back, Value::Null);
        }
        Ok(())
    }

    fn through_children(
        &mut self,
        relation: Relation,
        parent: &Value,
        payload: &Record,
    ) -> Result<(), Error> {
        let Some(through) = relation.through else {
            return Ok(());
        };
        let join = relation.target;
        let far = relation.far;
        let far_referenced = self
            .domain
            .referenced(through.foreign_key)
            .ok_or_else(|| Error::custom("through field is not a foreign key"))?;
        let back = Name::new(&relation.back_reference.name);
        let forward = Name::new(&through.foreign_key.name);
        let far_key = |row: &Record| column(row, &far_referenced.name).clone();
        let join_filter = |far_value: Value| {
            Filter::from_iter([(back.clone(), parent.clone()), (forward.clone(), far_value)])
        };

        let mut linked = vec![];
        for filter in items(payload, "connect") {
            let index = self.find(far, filter)?;
            linked.push(far_key(&self.db.tables[far.id.0][index]));
        }
        for data in items(payload, "create") {
            linked.push(far_key(&self.create(far, data)?));
        }
        for upsert in items(payload, "upsert") {
            let (create, update) = upsert_args(upsert);
            linked.push(far_key(&self.upsert(far, &create, &update)?));
        }
        for far_value in linked {
            self.create(join, &join_filter(far_value))?;
        }

        for update in items(payload, "update") {
            let filter = match update.get("where") {
                Some(Value::Object(filter)) => filter.clone(),
                _ => Filter::new(),
            };
            let far_value = far_key(&self.db.tables[far.id.0][self.find(far, &filter)?]);
            self.find(join, &join_filter(far_value))?;
            let data = match update.get("data") {
                Some(Value::Object(data)) => data.clone(),
                _ => Record::new(),
            };
            self.update(far, &data, &filter)?;
        }
        for (name, remove_far) in [("delete", true), ("disconnect", false)] {
            for filter in items(payload, name) {
                let far_value = far_key(&self.db.tables[far.id.0][self.find(far, filter)?]);
                self.delete(join, &join_filter(far_value))?;
                if remove_far {
                    self.delete(far, filter)?;
                }
            }
        }
        Ok(())
    }

    fn set(&mut self, model: &Model, index: usize, name: &Name, value: Value) {
        let row = &mut self.db.tables[model.id.0][index];
        row.insert(name.clone(), value);
        self.log.push(Call::Insert {
            model: model.name.clone(),
            record: row.clone(),
        });
    }

    fn next_id(&self, model: &Model, field: &Field) -> Value {
        let max = self.db.tables[model.id.0]
            .iter()
            .filter_map(|row| match column(row, &field.name) {
                Value::Number(n) => n.as_i64(),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        Value::from(max + 1)
    }

    fn check_unique(&self, model: &Model, row: &Record, skip: Option<usize>) -> Result<(), Error> {
        for field in &model.fields {
            if field.column().is_none() || !self.domain.is_unique(field) {
                continue;
            }
            let value = column(row, &field.name);
            if *value == Value::Null {
                continue;
            }
            let clash = self.db.tables[model.id.0]
                .iter()
                .enumerate()
                .any(|(i, other)| Some(i) != skip && column(other, &field.name) == value);
            if clash {
                return Err(Error::custom(format!(
                    "duplicate value {value} for unique field {}.{}",
                    model.name, field.name
                )));
            }
        }
        Ok(())
    }
}

/// The objects under `name` in a nested payload, which may be a single object or a list.
fn items<'p>(payload: &'p Record, name: &str) -> Vec<&'p Record> {
    match payload.get(name) {
        Some(Value::Object(item)) => vec![item],
        Some(Value::List(list)) => list
            .iter()
            .filter_map(|item| match item {
                Value::Object(item) => Some(item),
                _ => None,
            })
            .collect(),
        _ => vec![],
    }
}

fn upsert_args(upsert: &Record) -> (Record, Record) {
    let part = |name: &str| match upsert.get(name) {
        Some(Value::Object(data)) => data.clone(),
        _ => Record::new(),
    };
    (part("create"), part("update"))
}

fn or_filter(filter: Filter) -> Value {
    Value::List(
        filter
            .into_iter()
            .map(|(name, value)| Value::Object(Filter::from_iter([(name, value)])))
            .collect(),
    )
}
