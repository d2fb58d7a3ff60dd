//! RoutingService: lookups, metric writes and the reconcile loop.
//!
//! Every request works against the routemap's own lock. Metric writes
//! capture (track, signature) under the read lock and write to the store
//! after releasing it.

use std::sync::Arc;
use std::time::Duration;

use splitway_core::{ApplicationKey, ResourceRef, RoutemapSpec, ServiceConfig, Track};
use splitway_metrics::{Dashboard, LegacyApplication, build_dashboard, export_application};
use splitway_routing::{ResourceInspector, Routemap, RoutemapSnapshot, Routemaps};
use splitway_store::{MetricKey, MetricStore, VersionMetrics};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};

const TRANSACTION_ID_BYTES: usize = 16;

fn new_transaction_id() -> ServiceResult<String> {
    let mut buf = [0u8; TRANSACTION_ID_BYTES];
    getrandom::getrandom(&mut buf).map_err(|e| ServiceError::TransactionId(e.to_string()))?;
    Ok(hex::encode(buf))
}

fn parse_value(raw: &str) -> ServiceResult<f64> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| ServiceError::InvalidValue {
            value: raw.to_string(),
            reason: e.to_string(),
        })?;
    if !value.is_finite() {
        return Err(ServiceError::InvalidValue {
            value: raw.to_string(),
            reason: "not a finite number".to_string(),
        });
    }
    Ok(value)
}

pub struct RoutingService {
    routemaps: Routemaps,
    store: MetricStore,
    inspector: Arc<dyn ResourceInspector>,
    cluster_scoped: bool,
    reconcile_interval: Duration,
}

impl RoutingService {
    pub fn new(
        store: MetricStore,
        inspector: Arc<dyn ResourceInspector>,
        cluster_scoped: bool,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            routemaps: Routemaps::new(),
            store,
            inspector,
            cluster_scoped,
            reconcile_interval,
        }
    }

    /// Open the configured store and build a service around it.
    pub fn from_config(
        config: &ServiceConfig,
        inspector: Arc<dyn ResourceInspector>,
    ) -> ServiceResult<Self> {
        let store = MetricStore::open(&config.storage)?;
        info!(
            backend = store.backend_name(),
            cluster_scoped = config.routing.cluster_scoped,
            "routing service configured"
        );
        Ok(Self::new(
            store,
            inspector,
            config.routing.cluster_scoped,
            config.routing.reconcile_interval(),
        ))
    }

    pub fn routemaps(&self) -> &Routemaps {
        &self.routemaps
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    fn routemap(&self, application: &str) -> ServiceResult<(ApplicationKey, Arc<Routemap>)> {
        let key: ApplicationKey = application.parse()?;
        match self.routemaps.get(&key) {
            Some(routemap) => Ok((key, routemap)),
            None => Err(ServiceError::ApplicationNotFound(key)),
        }
    }

    // ── Routing ────────────────────────────────────────────────────

    /// Track `user` is routed to for `application`.
    pub fn lookup(&self, application: &str, user: &str) -> ServiceResult<Track> {
        if user.is_empty() {
            return Err(ServiceError::MissingUser);
        }
        let (key, routemap) = self.routemap(application)?;
        let track = routemap
            .select_track(user)
            .ok_or(ServiceError::NoRoutableVariant(key))?;
        debug!(application, user, %track, "lookup");
        Ok(track)
    }

    /// Record one transaction outcome for `user`. Returns the transaction id,
    /// generated when none was supplied.
    ///
    /// The value is recorded against the track the user is currently routed
    /// to and that track's current signature.
    pub fn write_metric(
        &self,
        application: &str,
        user: &str,
        metric: &str,
        value: &str,
        transaction: Option<&str>,
    ) -> ServiceResult<String> {
        if user.is_empty() {
            return Err(ServiceError::MissingUser);
        }
        let value = parse_value(value)?;
        let (key, routemap) = self.routemap(application)?;

        let resolution = routemap
            .resolve(user)
            .ok_or_else(|| ServiceError::NoRoutableVariant(key.clone()))?;
        let signature = resolution.signature.ok_or_else(|| ServiceError::UnknownVersion {
            app: key.clone(),
            track: resolution.track,
        })?;

        let transaction = match transaction {
            Some(id) => id.to_string(),
            None => new_transaction_id()?,
        };
        let metric_key = MetricKey {
            app: key.to_string(),
            track: resolution.track,
            signature,
            metric: metric.to_string(),
            user: user.to_string(),
            transaction,
        };
        self.store.set_metric(&metric_key, value)?;
        Ok(metric_key.transaction)
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Aggregated metrics of every observed track, in track order.
    pub fn version_metrics(&self, application: &str) -> ServiceResult<Vec<(Track, VersionMetrics)>> {
        let (key, routemap) = self.routemap(application)?;
        let app = key.to_string();
        routemap
            .signed_tracks()
            .into_iter()
            .map(|(track, signature)| -> ServiceResult<(Track, VersionMetrics)> {
                Ok((track, self.store.get_metrics(&app, track, &signature)?))
            })
            .collect()
    }

    pub fn dashboard(&self, application: &str) -> ServiceResult<Dashboard> {
        Ok(build_dashboard(&self.version_metrics(application)?))
    }

    /// Legacy fixed-array snapshot of an application.
    pub fn application_data(&self, application: &str) -> ServiceResult<LegacyApplication> {
        let (key, _) = self.routemap(application)?;
        let versions = self.version_metrics(application)?;
        Ok(export_application(&key.to_string(), &versions))
    }

    pub fn list_routemaps(&self) -> Vec<RoutemapSnapshot> {
        self.routemaps.list().iter().map(|rm| rm.snapshot()).collect()
    }

    // ── Configuration ──────────────────────────────────────────────

    /// Register or update a routemap and reconcile it straight away.
    pub fn apply_routemap(&self, spec: RoutemapSpec) -> ServiceResult<Arc<Routemap>> {
        let routemap = self.routemaps.upsert(spec, self.cluster_scoped)?;
        let weights = routemap.reconcile(self.inspector.as_ref());
        debug!(application = %routemap.key(), ?weights, "routemap applied");
        Ok(routemap)
    }

    /// Forget a routemap. Recorded metrics are left to expire.
    pub fn delete_routemap(&self, application: &str) -> ServiceResult<bool> {
        let key: ApplicationKey = application.parse()?;
        Ok(self.routemaps.remove(&key).is_some())
    }

    /// Reconcile every routemap. Returns how many were reconciled.
    pub fn reconcile_all(&self) -> usize {
        let routemaps = self.routemaps.list();
        for routemap in &routemaps {
            routemap.reconcile(self.inspector.as_ref());
        }
        routemaps.len()
    }

    /// Reconcile the routemaps that reference a changed resource.
    pub fn reconcile_resource(&self, namespace: &str, resource: &ResourceRef) -> usize {
        let affected = self.routemaps.find_by_resource(namespace, resource);
        for routemap in &affected {
            routemap.reconcile(self.inspector.as_ref());
        }
        affected.len()
    }

    /// Reconcile periodically and reclaim expired records until `shutdown`
    /// flips or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.reconcile_interval, "reconcile loop starting");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.reconcile_interval) => {
                    let count = self.reconcile_all();
                    debug!(count, "routemaps reconciled");
                    match self.store.purge_expired() {
                        Ok(0) => {}
                        Ok(purged) => debug!(purged, "expired records purged"),
                        Err(e) => warn!(error = %e, "failed to purge expired records"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconcile loop shutting down");
                    break;
                }
            }
        }
    }

    // ── Experiment results ─────────────────────────────────────────

    pub fn set_experiment_result(
        &self,
        namespace: &str,
        experiment: &str,
        result: &serde_json::Value,
    ) -> ServiceResult<()> {
        Ok(self.store.set_experiment_result(namespace, experiment, result)?)
    }

    pub fn get_experiment_result(
        &self,
        namespace: &str,
        experiment: &str,
    ) -> ServiceResult<Option<serde_json::Value>> {
        Ok(self.store.get_experiment_result(namespace, experiment)?)
    }
}
