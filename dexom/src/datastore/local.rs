use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use log::trace;
use parking_lot::RwLock;

use super::{Datastore, Key, Query, StoredEntity};
use crate::errors::RepoError;

/// `(kind, path, value token)` identifying one equality index bucket.
type IndexKey = (String, String, String);

#[derive(Debug, Default)]
struct LocalState {
    entities: BTreeMap<Key, StoredEntity>,
    indexes: HashMap<IndexKey, BTreeSet<Key>>,
    sequences: HashMap<String, i64>,
}

impl LocalState {
    fn unindex(&mut self, entity: &StoredEntity) {
        for index_key in index_keys(entity) {
            if let Some(bucket) = self.indexes.get_mut(&index_key) {
                bucket.remove(&entity.key);
                if bucket.is_empty() {
                    self.indexes.remove(&index_key);
                }
            }
        }
    }

    fn index(&mut self, entity: &StoredEntity) {
        for index_key in index_keys(entity) {
            self.indexes.entry(index_key).or_default().insert(entity.key.clone());
        }
    }
}

fn index_keys(entity: &StoredEntity) -> Vec<IndexKey> {
    entity
        .index_entries()
        .into_iter()
        .filter_map(|(path, value)| {
            value
                .index_token()
                .map(|token| (entity.key.kind.clone(), path, token))
        })
        .collect()
}

/// In-process, strongly consistent datastore.
///
/// Clones share the same storage, so a test can hand one handle to a client and keep
/// another to inspect the raw stored representation.
#[derive(Debug, Clone, Default)]
pub struct LocalDatastore {
    state: Arc<RwLock<LocalState>>,
}

impl LocalDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored entity, bypassing any client-side decoding.
    pub fn stored(&self, key: &Key) -> Option<StoredEntity> {
        self.state.read().entities.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live index buckets, for asserting that stale entries were removed.
    pub fn index_bucket_count(&self) -> usize {
        self.state.read().indexes.len()
    }

    /// Drop every entity, index entry and id sequence.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entities.clear();
        state.indexes.clear();
        state.sequences.clear();
    }
}

impl Datastore for LocalDatastore {
    async fn allocate_id(&mut self, kind: &str) -> Result<i64, RepoError> {
        let mut state = self.state.write();
        let next = state.sequences.entry(kind.to_string()).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn put(&mut self, entity: StoredEntity) -> Result<(), RepoError> {
        let mut state = self.state.write();
        if let Some(previous) = state.entities.remove(&entity.key) {
            state.unindex(&previous);
        }
        state.index(&entity);
        trace!("local put {}", entity.key);
        state.entities.insert(entity.key.clone(), entity);
        Ok(())
    }

    async fn get(&mut self, key: &Key) -> Result<Option<StoredEntity>, RepoError> {
        Ok(self.stored(key))
    }

    async fn delete(&mut self, key: &Key) -> Result<bool, RepoError> {
        let mut state = self.state.write();
        match state.entities.remove(key) {
            Some(previous) => {
                state.unindex(&previous);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query(&mut self, query: &Query) -> Result<Vec<StoredEntity>, RepoError> {
        let state = self.state.read();

        let mut candidates: Option<BTreeSet<Key>> = None;
        for filter in &query.filters {
            let Some(token) = filter.value.index_token() else {
                return Err(RepoError::InvalidRequest {
                    message: format!(
                        "cannot filter {} on a {} value",
                        filter.path,
                        filter.value.type_name()
                    ),
                });
            };
            let bucket = state
                .indexes
                .get(&(query.kind.clone(), filter.path.clone(), token))
                .cloned()
                .unwrap_or_default();
            candidates = Some(match candidates {
                Some(current) => current.intersection(&bucket).cloned().collect(),
                None => bucket,
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        let results = match candidates {
            Some(keys) => keys
                .iter()
                .filter_map(|key| state.entities.get(key))
                .take(limit)
                .cloned()
                .collect(),
            None => state
                .entities
                .values()
                .filter(|entity| entity.key.kind == query.kind)
                .take(limit)
                .cloned()
                .collect(),
        };
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{Property, PropertyFilter, PropertyMap};

    fn thing(id: i64, foo: Property) -> StoredEntity {
        let mut properties = PropertyMap::new();
        properties.insert("foo".to_string(), foo);
        StoredEntity::new(Key::new("Thing", id), properties)
    }

    fn foo_is_true() -> Query {
        Query::new("Thing").filter(PropertyFilter::eq("foo", true))
    }

    #[tokio::test]
    async fn resave_replaces_stale_index_entries() {
        let mut store = LocalDatastore::new();
        store.put(thing(1, Property::indexed(true))).await.unwrap();
        assert_eq!(store.query(&foo_is_true()).await.unwrap().len(), 1);

        store.put(thing(1, Property::unindexed(true))).await.unwrap();
        assert!(store.query(&foo_is_true()).await.unwrap().is_empty());
        assert_eq!(store.index_bucket_count(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_entity_and_index_entries() {
        let mut store = LocalDatastore::new();
        store.put(thing(1, Property::indexed(true))).await.unwrap();
        assert!(store.delete(&Key::new("Thing", 1)).await.unwrap());
        assert!(!store.delete(&Key::new("Thing", 1)).await.unwrap());
        assert!(store.query(&foo_is_true()).await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn ids_are_allocated_per_kind() {
        let mut store = LocalDatastore::new();
        assert_eq!(store.allocate_id("A").await.unwrap(), 1);
        assert_eq!(store.allocate_id("A").await.unwrap(), 2);
        assert_eq!(store.allocate_id("B").await.unwrap(), 1);
        store.clear();
        assert_eq!(store.allocate_id("A").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unfiltered_query_respects_kind_and_limit() {
        let mut store = LocalDatastore::new();
        for id in 1..=3 {
            store.put(thing(id, Property::unindexed(false))).await.unwrap();
        }
        let all = store.query(&Query::new("Thing")).await.unwrap();
        assert_eq!(all.len(), 3);
        let limited = store.query(&Query::new("Thing").limit(2)).await.unwrap();
        assert_eq!(limited[0].key, Key::new("Thing", 1));
        assert_eq!(limited.len(), 2);
        assert!(store.query(&Query::new("Other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn negative_zero_shares_the_zero_bucket() {
        let mut store = LocalDatastore::new();
        store.put(thing(1, Property::indexed(-0.0))).await.unwrap();

        let query = Query::new("Thing").filter(PropertyFilter::eq("foo", 0.0));
        let found = store.query(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(query.matches(&found[0]));
    }

    #[tokio::test]
    async fn nan_is_never_indexed() {
        let mut store = LocalDatastore::new();
        store.put(thing(1, Property::indexed(f64::NAN))).await.unwrap();
        assert_eq!(store.index_bucket_count(), 0);

        let query = Query::new("Thing").filter(PropertyFilter::eq("foo", f64::NAN));
        assert!(matches!(store.query(&query).await, Err(RepoError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let mut store = LocalDatastore::new();
        let observer = store.clone();
        store.put(thing(7, Property::indexed(true))).await.unwrap();
        let stored = observer.stored(&Key::new("Thing", 7)).expect("visible through clone");
        assert!(!stored.get("foo").unwrap().exclude_from_indexes);
    }
}
