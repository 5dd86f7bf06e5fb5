use log::{debug, trace};
use redis::{
    aio::{ConnectionLike, ConnectionManager},
    cmd,
};

use super::{
    Datastore, Key, Query, StoredEntity,
    scripts::{ENTITY_DELETE_SCRIPT, ENTITY_PUT_SCRIPT},
};
use crate::{errors::RepoError, keys::KeyContext};

/// Redis-backed datastore.
///
/// Entities are stored as JSON (flags included). Every value whose flag is clear gets a
/// membership in an equality index set; the put and delete scripts drop the previous
/// memberships in the same atomic step, so a re-save never leaves stale query results.
pub struct RedisDatastore<C> {
    conn: C,
    prefix: String,
}

impl RedisDatastore<ConnectionManager> {
    /// Open a managed connection to `url`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, RepoError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, prefix))
    }
}

impl<C> RedisDatastore<C>
where
    C: ConnectionLike + Send,
{
    pub fn new(conn: C, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Delete every key under this datastore's prefix. Uses SCAN so Redis is never blocked.
    pub async fn clear_prefix(&mut self) -> Result<u64, RepoError> {
        const SCAN_COUNT: usize = 1000;
        let pattern = format!("{}:*", self.prefix);
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut self.conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = cmd("DEL").arg(&keys).query_async(&mut self.conn).await?;
                total_deleted += deleted;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!("cleared {total_deleted} keys under {pattern}");
        Ok(total_deleted)
    }

    fn index_keys(&self, entity: &StoredEntity) -> Vec<String> {
        let ctx = KeyContext::new(&self.prefix, &entity.key.kind);
        let mut keys: Vec<String> = entity
            .index_entries()
            .into_iter()
            .filter_map(|(path, value)| value.index_token().map(|token| ctx.index(&path, &token)))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    async fn fetch_many(&mut self, entity_keys: &[String]) -> Result<Vec<StoredEntity>, RepoError> {
        if entity_keys.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Option<String>> = cmd("MGET").arg(entity_keys).query_async(&mut self.conn).await?;
        let mut entities = Vec::with_capacity(raw.len());
        for json in raw.into_iter().flatten() {
            entities.push(serde_json::from_str::<StoredEntity>(&json)?);
        }
        Ok(entities)
    }
}

impl<C> Datastore for RedisDatastore<C>
where
    C: ConnectionLike + Send,
{
    async fn allocate_id(&mut self, kind: &str) -> Result<i64, RepoError> {
        let ctx = KeyContext::new(&self.prefix, kind);
        let id: i64 = cmd("INCR").arg(ctx.sequence()).query_async(&mut self.conn).await?;
        Ok(id)
    }

    async fn put(&mut self, entity: StoredEntity) -> Result<(), RepoError> {
        let ctx = KeyContext::new(&self.prefix, &entity.key.kind);
        let index_keys = self.index_keys(&entity);
        let payload = serde_json::to_string(&entity)?;

        let mut invocation = ENTITY_PUT_SCRIPT.prepare_invoke();
        invocation
            .key(ctx.entity(&entity.key))
            .key(ctx.entity_indexes(&entity.key))
            .key(ctx.members());
        invocation.arg(payload);
        for index_key in &index_keys {
            invocation.arg(index_key);
        }
        let indexed: i64 = invocation.invoke_async(&mut self.conn).await?;
        debug!("redis put {} with {indexed} index entries", entity.key);
        Ok(())
    }

    async fn get(&mut self, key: &Key) -> Result<Option<StoredEntity>, RepoError> {
        let ctx = KeyContext::new(&self.prefix, &key.kind);
        let raw: Option<String> = cmd("GET").arg(ctx.entity(key)).query_async(&mut self.conn).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&mut self, key: &Key) -> Result<bool, RepoError> {
        let ctx = KeyContext::new(&self.prefix, &key.kind);
        let mut invocation = ENTITY_DELETE_SCRIPT.prepare_invoke();
        invocation
            .key(ctx.entity(key))
            .key(ctx.entity_indexes(key))
            .key(ctx.members());
        let deleted: i64 = invocation.invoke_async(&mut self.conn).await?;
        Ok(deleted > 0)
    }

    async fn query(&mut self, query: &Query) -> Result<Vec<StoredEntity>, RepoError> {
        let ctx = KeyContext::new(&self.prefix, &query.kind);
        let entity_keys: Vec<String> = if query.filters.is_empty() {
            cmd("SMEMBERS").arg(ctx.members()).query_async(&mut self.conn).await?
        } else {
            let mut buckets = Vec::with_capacity(query.filters.len());
            for filter in &query.filters {
                let token = filter.value.index_token().ok_or_else(|| RepoError::InvalidRequest {
                    message: format!("cannot filter {} on a {} value", filter.path, filter.value.type_name()),
                })?;
                buckets.push(ctx.index(&filter.path, &token));
            }
            trace!("redis query buckets {buckets:?}");
            cmd("SINTER").arg(&buckets).query_async(&mut self.conn).await?
        };

        let mut entities = self.fetch_many(&entity_keys).await?;
        entities.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(limit) = query.limit {
            entities.truncate(limit);
        }
        Ok(entities)
    }
}
