use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LockStoreError {
    #[error("Lock store unavailable: {0}")]
    Unavailable(String),
    #[error("Lock store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed lock entry at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Key-value store with expiring entries. Every conditional operation must be
/// a single atomic step on the backend, never a read followed by a write.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` to `value` with `ttl` only if `key` is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockStoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError>;

    /// Reset the TTL of `key` if it still holds exactly `expected`.
    async fn refresh_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool, LockStoreError>;

    /// Delete `key` if it still holds exactly `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockStoreError>;

    /// Unconditional delete. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<bool, LockStoreError>;

    /// Live entries whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, LockStoreError>;

    /// Reclaim expired entries. Backends with native expiry have nothing to do.
    async fn purge_expired(&self) -> Result<usize, LockStoreError> {
        Ok(0)
    }
}
