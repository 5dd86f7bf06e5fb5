//! Typed entry point for saving, loading and querying entities.
//!
//! ```ignore
//! let mut client = Client::new(LocalDatastore::new());
//! client.register::<Thing>()?;
//!
//! let mut thing = Thing { id: None, foo: true, bar: false };
//! let key = client.save(&mut thing).await?;
//! let found = client.query::<Thing>().filter("foo", true).list().await?;
//! ```

mod query;

pub use query::QueryBuilder;

use std::sync::Arc;

use log::debug;
use redis::aio::ConnectionManager;

use crate::{
    datastore::{Datastore, Key, KeyId, RedisDatastore, StoredEntity},
    errors::RepoError,
    indexing,
    registry::Registry,
    schema::EntitySchema,
    types::Entity,
};

/// Client over a [`Datastore`], resolving schemas through a [`Registry`].
pub struct Client<D> {
    datastore: D,
    registry: Arc<Registry>,
}

impl Client<RedisDatastore<ConnectionManager>> {
    /// Connect to Redis at `url`, storing keys under `prefix`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, RepoError> {
        Ok(Self::new(RedisDatastore::connect(url, prefix).await?))
    }
}

impl<D: Datastore> Client<D> {
    /// Client backed by the process-wide registry.
    pub fn new(datastore: D) -> Self {
        Self::with_registry(datastore, Registry::global())
    }

    pub fn with_registry(datastore: D, registry: Arc<Registry>) -> Self {
        Self { datastore, registry }
    }

    /// Resolve the schema of `T`. Misdeclared markers are reported here.
    pub fn register<T: Entity>(&self) -> Result<Arc<EntitySchema<T>>, RepoError> {
        self.registry.register::<T>()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The underlying store, for reading raw stored representations.
    pub fn datastore(&self) -> &D {
        &self.datastore
    }

    pub fn datastore_mut(&mut self) -> &mut D {
        &mut self.datastore
    }

    /// Save `entity`, allocating an id first when it has none.
    ///
    /// Indexing decisions are made before anything is written: if a condition fails,
    /// the error is returned and neither an id nor an entity is stored.
    pub async fn save<T: Entity>(&mut self, entity: &mut T) -> Result<Key, RepoError> {
        let schema = self.registry.register::<T>()?;
        let properties = indexing::encode(&schema, entity)?;
        let key = self.key_for(entity).await?;
        self.datastore.put(StoredEntity::new(key.clone(), properties)).await?;
        debug!("saved {key}");
        Ok(key)
    }

    /// Save several entities of one type. Every entity is encoded before the first write.
    pub async fn save_all<T: Entity>(&mut self, entities: &mut [T]) -> Result<Vec<Key>, RepoError> {
        let schema = self.registry.register::<T>()?;
        let mut encoded = Vec::with_capacity(entities.len());
        for entity in entities.iter() {
            encoded.push(indexing::encode(&schema, entity)?);
        }

        let mut keys = Vec::with_capacity(entities.len());
        for (entity, properties) in entities.iter_mut().zip(encoded) {
            let key = self.key_for(entity).await?;
            self.datastore.put(StoredEntity::new(key.clone(), properties)).await?;
            keys.push(key);
        }
        debug!("saved {} {} entities", keys.len(), T::KIND);
        Ok(keys)
    }

    pub async fn load<T: Entity>(&mut self, id: impl Into<KeyId>) -> Result<Option<T>, RepoError> {
        let schema = self.registry.register::<T>()?;
        let key = Key::new(T::KIND, id);
        match self.datastore.get(&key).await? {
            Some(stored) => Ok(Some(indexing::decode(&schema, &stored)?)),
            None => Ok(None),
        }
    }

    /// Like [`Client::load`], but a missing entity is an error.
    pub async fn get<T: Entity>(&mut self, id: impl Into<KeyId>) -> Result<T, RepoError> {
        let id = id.into();
        let key = Key::new(T::KIND, id.clone());
        self.load::<T>(id).await?.ok_or(RepoError::NotFound { key })
    }

    /// Returns whether an entity was removed.
    pub async fn delete<T: Entity>(&mut self, id: impl Into<KeyId>) -> Result<bool, RepoError> {
        let key = Key::new(T::KIND, id);
        let deleted = self.datastore.delete(&key).await?;
        debug!("delete {key}: {deleted}");
        Ok(deleted)
    }

    /// Start an equality query over `T`.
    pub fn query<T: Entity>(&mut self) -> QueryBuilder<'_, D, T> {
        QueryBuilder::new(self)
    }

    async fn key_for<T: Entity>(&mut self, entity: &mut T) -> Result<Key, RepoError> {
        match entity.entity_id() {
            Some(id) => Ok(Key::new(T::KIND, id)),
            None => {
                let id = self.datastore.allocate_id(T::KIND).await?;
                entity.assign_id(id);
                // Named-id types store the allocated number as their name.
                Ok(Key::new(T::KIND, entity.entity_id().unwrap_or(KeyId::Id(id))))
            }
        }
    }
}
