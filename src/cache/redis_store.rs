use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::Pool as RedisPool;
use bb8_redis::RedisConnectionManager;
use tracing::{debug, info, instrument};

use super::{CacheKeys, CacheSnapshot, CacheStore, COST_DISTRIBUTION, DEPARTMENTS, TOP_CONDITIONS};
use crate::config::CacheConfig;
use crate::error::{PipelineError, Result};

const STORE: &str = "cache store";
const SCAN_BATCH: usize = 500;

/// Redis-backed dashboard cache
pub struct RedisCache {
    pool: RedisPool<RedisConnectionManager>,
    keys: CacheKeys,
}

impl RedisCache {
    pub async fn connect(config: &CacheConfig, timeout: Duration) -> Result<Self> {
        let manager =
            RedisConnectionManager::new(config.url.as_str()).map_err(|e| PipelineError::unavailable(STORE, e))?;
        let pool = RedisPool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(timeout)
            .build(manager)
            .await
            .map_err(|e| PipelineError::unavailable(STORE, e))?;

        let cache = Self {
            pool,
            keys: CacheKeys::new(config.namespace.clone()),
        };
        cache
            .ping()
            .await
            .map_err(|e| PipelineError::unavailable(STORE, e))?;
        info!("Connected to cache store, namespace {}", config.namespace);
        Ok(cache)
    }

    async fn namespace_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let pattern = self.keys.pattern();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("PING").query_async::<_, String>(&mut *conn).await?;
        Ok(())
    }

    #[instrument(skip(self, snapshot), fields(namespace = %self.keys.pattern()))]
    async fn replace_namespace(&self, snapshot: &CacheSnapshot) -> Result<()> {
        let stale = self.namespace_keys().await?;

        let pipe = replacement_pipeline(&self.keys, &stale, snapshot);

        let mut conn = self.pool.get().await?;
        pipe.query_async::<_, ()>(&mut *conn).await?;
        debug!("Replaced {} cache keys", stale.len());
        Ok(())
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let value = redis::cmd("INCRBY")
            .arg(self.keys.key(key))
            .arg(by)
            .query_async(&mut *conn)
            .await?;
        Ok(value)
    }

    async fn increment_field(&self, key: &str, field: &str, by: i64) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let value = redis::cmd("HINCRBY")
            .arg(self.keys.key(key))
            .arg(field)
            .arg(by)
            .query_async(&mut *conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("SET")
            .arg(self.keys.key(key))
            .arg(value)
            .query_async::<_, ()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn fields(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let fields = redis::cmd("HKEYS")
            .arg(self.keys.key(key))
            .query_async(&mut *conn)
            .await?;
        Ok(fields)
    }

    async fn key_count(&self) -> Result<u64> {
        Ok(self.namespace_keys().await?.len() as u64)
    }
}

/// One MULTI/EXEC that deletes `stale` and writes every key of `snapshot`, so
/// readers see either the previous namespace or the new one.
fn replacement_pipeline(keys: &CacheKeys, stale: &[String], snapshot: &CacheSnapshot) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    if !stale.is_empty() {
        pipe.del(stale).ignore();
    }
    for (name, value) in snapshot.scalars() {
        pipe.set(keys.key(name), value).ignore();
    }
    for (name, tallies) in [
        (DEPARTMENTS, &snapshot.departments),
        (COST_DISTRIBUTION, &snapshot.cost_distribution),
    ] {
        if tallies.is_empty() {
            continue;
        }
        let fields: Vec<(&str, u64)> = tallies.iter().map(|t| (t.label.as_str(), t.count)).collect();
        pipe.hset_multiple(keys.key(name), &fields).ignore();
    }
    if !snapshot.top_conditions.is_empty() {
        let members: Vec<(u64, &str)> = snapshot
            .top_conditions
            .iter()
            .map(|t| (t.count, t.label.as_str()))
            .collect();
        pipe.zadd_multiple(keys.key(TOP_CONDITIONS), &members).ignore();
    }
    pipe
}
