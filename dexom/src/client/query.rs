use std::marker::PhantomData;

use log::warn;

use super::Client;
use crate::{
    datastore::{Datastore, Key, PropertyFilter, Query, Value},
    errors::RepoError,
    indexing,
    types::Entity,
};

/// Equality query over one entity type. Only values saved as indexed can match.
pub struct QueryBuilder<'a, D, T> {
    client: &'a mut Client<D>,
    query: Query,
    error: Option<RepoError>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, D: Datastore, T: Entity> QueryBuilder<'a, D, T> {
    pub(super) fn new(client: &'a mut Client<D>) -> Self {
        Self {
            client,
            query: Query::new(T::KIND),
            error: None,
            _marker: PhantomData,
        }
    }

    /// Require the value at `path` (dotted for embedded fields) to equal `value`.
    pub fn filter(mut self, path: &str, value: impl Into<Value>) -> Self {
        if self.error.is_none() {
            match self.check_path(path) {
                Ok(()) => self.query = self.query.filter(PropertyFilter::eq(path, value)),
                Err(err) => self.error = Some(err),
            }
        }
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    pub async fn list(self) -> Result<Vec<T>, RepoError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let schema = self.client.registry.register::<T>()?;
        let stored = self.client.datastore.query(&self.query).await?;
        stored.iter().map(|entity| indexing::decode(&schema, entity)).collect()
    }

    pub async fn first(self) -> Result<Option<T>, RepoError> {
        Ok(self.limit(1).list().await?.into_iter().next())
    }

    pub async fn keys(self) -> Result<Vec<Key>, RepoError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let stored = self.client.datastore.query(&self.query).await?;
        Ok(stored.into_iter().map(|entity| entity.key).collect())
    }

    fn check_path(&self, path: &str) -> Result<(), RepoError> {
        let schema = self.client.registry.register::<T>()?;
        let head = path.split('.').next().unwrap_or(path);
        if head == T::ID_FIELD {
            return Err(RepoError::InvalidRequest {
                message: format!("{}.{head} is the key and cannot be filtered on", T::KIND),
            });
        }
        match schema.field(head) {
            Some(field) if field.directive().is_never_indexed() => {
                warn!("{}.{head} is never indexed; filtering on it matches nothing", T::KIND);
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(RepoError::InvalidRequest {
                message: format!("{} has no declared field {head}", T::KIND),
            }),
        }
    }
}
