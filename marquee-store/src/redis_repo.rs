use async_trait::async_trait;
use marquee_core::{LockStore, LockStoreError};
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const COMPARE_AND_DELETE: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

const COMPARE_AND_EXPIRE: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("EXPIRE", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// Seat locks in Redis. Opening the client does not connect, so the service
/// starts even with Redis down; each call dials on its own connection and
/// reports failures as `LockStoreError`.
#[derive(Clone)]
pub struct RedisLockStore {
    client: redis::Client,
    operation_timeout: Duration,
    compare_and_delete: redis::Script,
    compare_and_expire: redis::Script,
}

impl RedisLockStore {
    pub fn new(connection_string: &str, operation_timeout: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            operation_timeout,
            compare_and_delete: redis::Script::new(COMPARE_AND_DELETE),
            compare_and_expire: redis::Script::new(COMPARE_AND_EXPIRE),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, LockStoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LockStoreError::Unavailable(e.to_string())),
            Err(_) => Err(LockStoreError::Timeout(self.operation_timeout)),
        }
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        self.run(async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            // SET NX EX: one round trip, no window between the check and the write
            let result: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_seconds(ttl))
                .query_async(&mut conn)
                .await?;
            Ok::<_, redis::RedisError>(result.is_some())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        self.run(async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let value: Option<String> = conn.get(key).await?;
            Ok::<_, redis::RedisError>(value)
        })
        .await
    }

    async fn refresh_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        self.run(async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let updated: i64 = self
                .compare_and_expire
                .key(key)
                .arg(expected)
                .arg(ttl_seconds(ttl))
                .invoke_async(&mut conn)
                .await?;
            Ok::<_, redis::RedisError>(updated == 1)
        })
        .await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockStoreError> {
        self.run(async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let deleted: i64 = self
                .compare_and_delete
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await?;
            Ok::<_, redis::RedisError>(deleted == 1)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, LockStoreError> {
        self.run(async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let deleted: i64 = conn.del(key).await?;
            Ok::<_, redis::RedisError>(deleted > 0)
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, LockStoreError> {
        let pattern = format!("{}*", prefix);
        self.run(async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let mut keys: Vec<String> = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(200)
                    .query_async(&mut conn)
                    .await?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            // SCAN may return a key more than once
            keys.sort();
            keys.dedup();

            let mut entries = Vec::with_capacity(keys.len());
            for key in keys {
                // expired between SCAN and GET
                let value: Option<String> = conn.get(&key).await?;
                if let Some(value) = value {
                    entries.push((key, value));
                }
            }
            debug!(%pattern, found = entries.len(), "Scanned seat locks");
            Ok::<_, redis::RedisError>(entries)
        })
        .await
    }
}
