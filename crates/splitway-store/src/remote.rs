//! RemoteBackend: Redis-compatible metric storage.
//!
//! Redis has no ordered iterator, so prefix scans walk `SCAN ... MATCH
//! <prefix>*`, sort the keys client-side, and fetch values with `MGET`.
//! Values are written with `SET ... EX <ttl>` when a TTL is configured.

use std::time::Duration;

use parking_lot::Mutex;
use splitway_core::config::RemoteConfig;
use tracing::{debug, warn};

use crate::backend::KvBackend;
use crate::error::{StoreError, StoreResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const SCAN_BATCH: usize = 1000;
const MGET_BATCH: usize = 1000;

/// Turn a `host:port` address into a connection URL.
fn connection_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{address}/")
    }
}

/// Escape glob metacharacters so the prefix matches literally.
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 2);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('*');
    pattern
}

/// Metric storage on a Redis-compatible server.
///
/// Holds one lazily opened connection. A failed command drops it so the
/// next call reconnects.
pub struct RemoteBackend {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
    address: String,
    ttl: Option<Duration>,
}

impl RemoteBackend {
    /// Validate the address. No connection is made until the first command.
    pub fn open(config: &RemoteConfig, ttl: Option<Duration>) -> StoreResult<Self> {
        let url = connection_url(&config.address);
        let client = redis::Client::open(url.as_str())
            .map_err(|e| StoreError::Config(format!("remote address {}: {e}", config.address)))?;
        debug!(address = %config.address, ?ttl, "remote metric store configured");
        Ok(Self {
            client,
            conn: Mutex::new(None),
            address: config.address.clone(),
            ttl,
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            let conn = self
                .client
                .get_connection_with_timeout(CONNECT_TIMEOUT)
                .map_err(|e| StoreError::Connection(format!("{}: {e}", self.address)))?;
            debug!(address = %self.address, "connected to remote metric store");
            *guard = Some(conn);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Connection(format!(
                "{}: no connection available",
                self.address
            )));
        };
        match op(conn) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(address = %self.address, error = %e, "remote command failed, dropping connection");
                *guard = None;
                Err(StoreError::Command(e.to_string()))
            }
        }
    }

    /// Every key under `prefix`, sorted and de-duplicated.
    fn scan_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let pattern = scan_pattern(prefix);
        let mut keys = self.with_connection(|conn| {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query(conn)?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Ok(keys)
        })?;
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

impl KvBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = self.ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        self.with_connection(|conn| cmd.query::<()>(conn))
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_connection(|conn| redis::cmd("GET").arg(key).query::<Option<Vec<u8>>>(conn))
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let keys = self.scan_keys(prefix)?;
        let mut results = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(MGET_BATCH) {
            let values = self.with_connection(|conn| {
                let mut cmd = redis::cmd("MGET");
                for key in chunk {
                    cmd.arg(key);
                }
                cmd.query::<Vec<Option<Vec<u8>>>>(conn)
            })?;
            // Keys that expired between SCAN and MGET come back as nil.
            for (key, value) in chunk.iter().zip(values) {
                if let Some(value) = value {
                    results.push((key.clone(), value));
                }
            }
        }
        Ok(results)
    }

    fn count_prefix(&self, prefix: &str) -> StoreResult<usize> {
        Ok(self.scan_keys(prefix)?.len())
    }
}
