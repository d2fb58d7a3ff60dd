//! The primitive key-value interface every storage engine implements.

use crate::error::StoreResult;

/// Ordered-scan key-value store with instance-wide expiry.
///
/// Implementations must be safe to share across request tasks. Each call is
/// individually atomic; nothing spans calls.
pub trait KvBackend: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Insert or overwrite a value, applying the instance's TTL.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Fetch a live value.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// All live entries whose key starts with `prefix`, sorted by key.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Number of live entries whose key starts with `prefix`.
    fn count_prefix(&self, prefix: &str) -> StoreResult<usize> {
        Ok(self.scan_prefix(prefix)?.len())
    }

    /// Reclaim expired entries. Engines that expire keys themselves do nothing.
    fn purge_expired(&self) -> StoreResult<usize> {
        Ok(0)
    }
}
