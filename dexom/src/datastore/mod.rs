//! Datastore write path and query surface.
//!
//! The indexing engine hands a [`StoredEntity`] to a [`Datastore`]; the datastore is
//! responsible for honouring each value's `exclude_from_indexes` flag when it answers
//! queries.

mod local;
mod redis_store;
mod scripts;
mod value;

pub use local::LocalDatastore;
pub use redis_store::RedisDatastore;
pub use value::{EmbeddedEntity, FlatProperty, Key, KeyId, Property, PropertyMap, StoredEntity, Value};

use crate::errors::RepoError;

/// Equality filter on a dotted property path.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub path: String,
    pub value: Value,
}

impl PropertyFilter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Whether an indexed entry `(path, value)` satisfies this filter.
    pub fn matches(&self, path: &str, value: &Value) -> bool {
        self.path == path && self.value.index_token().is_some() && &self.value == value
    }
}

/// Kind-scoped query. All filters must match (logical AND).
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub kind: String,
    pub filters: Vec<PropertyFilter>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: PropertyFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate the filters against an entity's index entries.
    pub fn matches(&self, entity: &StoredEntity) -> bool {
        if entity.key.kind != self.kind {
            return false;
        }
        let entries = entity.index_entries();
        self.filters
            .iter()
            .all(|filter| entries.iter().any(|(path, value)| filter.matches(path, value)))
    }
}

/// Storage backend consumed by [`crate::Client`].
#[allow(async_fn_in_trait)]
pub trait Datastore {
    /// Reserve a fresh numeric id for `kind`.
    async fn allocate_id(&mut self, kind: &str) -> Result<i64, RepoError>;

    /// Write the entity, replacing any previous version and its index entries.
    async fn put(&mut self, entity: StoredEntity) -> Result<(), RepoError>;

    async fn get(&mut self, key: &Key) -> Result<Option<StoredEntity>, RepoError>;

    /// Remove the entity. Returns `false` when nothing was stored under `key`.
    async fn delete(&mut self, key: &Key) -> Result<bool, RepoError>;

    /// Entities of `query.kind` whose indexed values satisfy every filter, in key order.
    async fn query(&mut self, query: &Query) -> Result<Vec<StoredEntity>, RepoError>;
}
