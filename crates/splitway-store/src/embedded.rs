//! EmbeddedBackend: redb-backed metric storage.
//!
//! One database file under a pre-mounted directory. Every value is stored
//! behind an expiry header; reads skip expired entries and `purge_expired`
//! reclaims them.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use splitway_core::config::EmbeddedConfig;
use tracing::debug;

use crate::backend::KvBackend;
use crate::error::{StoreError, StoreResult};
use crate::tables::ENTRIES;

/// Database file created inside the configured directory.
pub const DATABASE_FILE: &str = "splitway.redb";

const HEADER_LEN: usize = 8;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn encode_entry(expires_at: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&expires_at.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Split a stored value into its expiry and payload.
fn decode_entry<'a>(key: &str, raw: &'a [u8]) -> StoreResult<(u64, &'a [u8])> {
    if raw.len() < HEADER_LEN {
        return Err(StoreError::Deserialize(format!(
            "entry '{key}' is shorter than its expiry header"
        )));
    }
    let (header, payload) = raw.split_at(HEADER_LEN);
    let mut expiry = [0u8; HEADER_LEN];
    expiry.copy_from_slice(header);
    Ok((u64::from_be_bytes(expiry), payload))
}

fn is_expired(expires_at: u64, now: u64) -> bool {
    expires_at != 0 && expires_at <= now
}

/// Thread-safe metric storage backed by redb.
#[derive(Clone)]
pub struct EmbeddedBackend {
    db: Arc<Database>,
    ttl: Option<Duration>,
}

impl EmbeddedBackend {
    /// Open (or create) the database inside the configured directory.
    ///
    /// The directory must already exist. A separate value directory is not
    /// supported; if one is configured it must be the same path.
    pub fn open(config: &EmbeddedConfig, ttl: Option<Duration>) -> StoreResult<Self> {
        if !config.dir.is_dir() {
            return Err(StoreError::NotMounted(config.dir.clone()));
        }
        if let Some(value_dir) = &config.value_dir {
            if value_dir != &config.dir {
                return Err(StoreError::Config(format!(
                    "value directory {} must equal metrics directory {}",
                    value_dir.display(),
                    config.dir.display()
                )));
            }
        }
        Self::open_path(&config.dir.join(DATABASE_FILE), ttl)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_path(path: &Path, ttl: Option<Duration>) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let backend = Self {
            db: Arc::new(db),
            ttl,
        };
        backend.ensure_tables()?;
        debug!(?path, ?ttl, "embedded metric store opened");
        Ok(backend)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory(ttl: Option<Duration>) -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let backend = Self {
            db: Arc::new(db),
            ttl,
        };
        backend.ensure_tables()?;
        debug!("in-memory metric store opened");
        Ok(backend)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn expiry_from(&self, now: u64) -> u64 {
        self.ttl
            .map(|ttl| now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)))
            .unwrap_or(0)
    }

    fn put_with_expiry(&self, key: &str, value: &[u8], expires_at: u64) -> StoreResult<()> {
        let entry = encode_entry(expires_at, value);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
            table
                .insert(key, entry.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl KvBackend for EmbeddedBackend {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.put_with_expiry(key, value, self.expiry_from(now_millis()))
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let (expires_at, payload) = decode_entry(key, guard.value())?;
                if is_expired(expires_at, now_millis()) {
                    Ok(None)
                } else {
                    Ok(Some(payload.to_vec()))
                }
            }
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let now = now_millis();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            let (expires_at, payload) = decode_entry(key, value.value())?;
            if !is_expired(expires_at, now) {
                results.push((key.to_string(), payload.to_vec()));
            }
        }
        Ok(results)
    }

    /// Delete every expired entry. Returns the number removed.
    fn purge_expired(&self) -> StoreResult<usize> {
        let now = now_millis();
        // Collect keys in a read transaction first.
        let expired: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let (expires_at, _) = decode_entry(key.value(), value.value())?;
                if is_expired(expires_at, now) {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };
        if expired.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
            for key in &expired {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = expired.len(), "expired metric entries purged");
        Ok(expired.len())
    }
}
