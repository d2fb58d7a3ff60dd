//! MetricStore: backend-agnostic metric recording and aggregation.
//!
//! Owns the key layout and the grouping scan, so any [`KvBackend`] that
//! honours the ordered-prefix contract yields identical results.

use std::sync::Arc;

use splitway_core::config::{BackendKind, StorageConfig};
use splitway_core::{Signature, Track};
use tracing::debug;

use crate::backend::KvBackend;
use crate::codec::{KeyCodec, MetricKey, UserKey};
use crate::embedded::EmbeddedBackend;
use crate::error::{StoreError, StoreResult};
use crate::remote::RemoteBackend;
use crate::types::{MetricSeries, VersionMetrics};

/// Value stored under every user presence key.
const USER_MARKER: &[u8] = b"true";

fn decode_value(key: &str, raw: &[u8]) -> StoreResult<f64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| StoreError::Deserialize(format!("value under '{key}' is not a number")))
}

/// Thread-safe metric store over a shared backend.
#[derive(Clone)]
pub struct MetricStore {
    backend: Arc<dyn KvBackend>,
}

impl MetricStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Build the backend selected by configuration.
    pub fn open(config: &StorageConfig) -> StoreResult<Self> {
        let backend: Arc<dyn KvBackend> = match config.backend {
            BackendKind::Embedded => Arc::new(EmbeddedBackend::open(&config.embedded, config.ttl())?),
            BackendKind::Remote => Arc::new(RemoteBackend::open(&config.remote, config.ttl())?),
        };
        debug!(backend = backend.name(), "metric store ready");
        Ok(Self::new(backend))
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(Arc::new(EmbeddedBackend::open_in_memory(None)?)))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Reclaim expired records. Returns the number removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        self.backend.purge_expired()
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Record one transaction's value and mark its user as present.
    ///
    /// Writing the same key again overwrites the same slot.
    pub fn set_metric(&self, key: &MetricKey, value: f64) -> StoreResult<()> {
        let encoded = key.encode()?;
        self.backend.put(&encoded, value.to_string().as_bytes())?;
        debug!(key = %encoded, value, "metric recorded");
        self.set_user(&key.user_key())
    }

    /// Mark a user as routed to a track generation.
    pub fn set_user(&self, key: &UserKey) -> StoreResult<()> {
        let encoded = key.encode()?;
        self.backend.put(&encoded, USER_MARKER)
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Number of distinct users registered for a track generation.
    pub fn user_count(&self, app: &str, track: Track, signature: &Signature) -> StoreResult<usize> {
        let prefix = KeyCodec::user_key_prefix(app, track, signature)?;
        self.backend.count_prefix(&prefix)
    }

    /// Aggregate every metric of a track generation.
    ///
    /// Consecutive keys sharing (metric, user) form one user group: each
    /// value lands in `transactions_series` and the group's sum in
    /// `users_series`. Each metric's `users_series` is then zero-padded to
    /// the registered user count.
    pub fn get_metrics(
        &self,
        app: &str,
        track: Track,
        signature: &Signature,
    ) -> StoreResult<VersionMetrics> {
        let prefix = KeyCodec::metric_key_prefix(app, track, signature)?;
        let user_count = self.user_count(app, track, signature)?;
        let entries = self.backend.scan_prefix(&prefix)?;

        let mut metrics = VersionMetrics::new();
        let mut current_metric: Option<String> = None;
        let mut current_user: Option<String> = None;
        let mut user_total = 0.0;

        for (key, raw) in &entries {
            let parsed = MetricKey::parse(key)?;
            let value = decode_value(key, raw)?;

            let same_metric = current_metric.as_deref() == Some(parsed.metric.as_str());
            let same_user = same_metric && current_user.as_deref() == Some(parsed.user.as_str());
            if !same_user {
                if let Some(metric) = &current_metric {
                    let series = metrics.entry(metric.clone()).or_default();
                    series.users_series.push(user_total);
                    if !same_metric {
                        series.pad_users(user_count);
                    }
                }
                user_total = 0.0;
            }

            user_total += value;
            metrics
                .entry(parsed.metric.clone())
                .or_default()
                .transactions_series
                .push(value);
            current_metric = Some(parsed.metric);
            current_user = Some(parsed.user);
        }

        if let Some(metric) = current_metric {
            let series = metrics.entry(metric).or_default();
            series.users_series.push(user_total);
            series.pad_users(user_count);
        }

        debug!(
            app,
            %track,
            %signature,
            entries = entries.len(),
            users = user_count,
            "metrics aggregated"
        );
        Ok(metrics)
    }

    /// One metric of a track generation; empty when nothing was recorded.
    pub fn get_metric(
        &self,
        app: &str,
        track: Track,
        signature: &Signature,
        metric: &str,
    ) -> StoreResult<MetricSeries> {
        KeyCodec::validate_token("metric", metric)?;
        let mut metrics = self.get_metrics(app, track, signature)?;
        Ok(metrics.remove(metric).unwrap_or_default())
    }

    // ── Experiment results ─────────────────────────────────────────

    pub fn set_experiment_result(
        &self,
        namespace: &str,
        experiment: &str,
        result: &serde_json::Value,
    ) -> StoreResult<()> {
        let key = KeyCodec::result_key(namespace, experiment)?;
        let value = serde_json::to_vec(result).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.backend.put(&key, &value)?;
        debug!(%key, "experiment result stored");
        Ok(())
    }

    pub fn get_experiment_result(
        &self,
        namespace: &str,
        experiment: &str,
    ) -> StoreResult<Option<serde_json::Value>> {
        let key = KeyCodec::result_key(namespace, experiment)?;
        match self.backend.get(&key)? {
            Some(raw) => {
                let value = serde_json::from_slice(&raw)
                    .map_err(|e| StoreError::Deserialize(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
