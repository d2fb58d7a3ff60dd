//! Per-application A/B/n dashboard payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use splitway_core::Track;
use splitway_store::VersionMetrics;
use tracing::debug;

use crate::histogram::{DEFAULT_BUCKETS, DEFAULT_DECIMAL_PLACES, HistogramBucket, calculate_histogram};
use crate::summary::{SummarizedMetric, summarize};

/// Summary of one metric for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: Track,
    #[serde(flatten)]
    pub summary: SummarizedMetric,
}

/// Everything the dashboard shows for one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub histograms_over_transactions: Vec<HistogramBucket>,
    pub histograms_over_users: Vec<HistogramBucket>,
    pub summary_over_transactions: Vec<VersionSummary>,
    pub summary_over_users: Vec<VersionSummary>,
}

/// Metric name → cross-track summary.
pub type Dashboard = BTreeMap<String, MetricSummary>;

/// Summarize every metric reported by any track.
///
/// A track only appears under the metrics it reported.
pub fn build_dashboard(versions: &[(Track, VersionMetrics)]) -> Dashboard {
    let mut dashboard = Dashboard::new();
    let mut over_transactions: BTreeMap<&str, BTreeMap<Track, Vec<f64>>> = BTreeMap::new();
    let mut over_users: BTreeMap<&str, BTreeMap<Track, Vec<f64>>> = BTreeMap::new();

    for (track, metrics) in versions {
        for (metric, series) in metrics {
            let entry = dashboard.entry(metric.clone()).or_default();
            entry.summary_over_transactions.push(VersionSummary {
                version: *track,
                summary: summarize(&series.transactions_series),
            });
            entry.summary_over_users.push(VersionSummary {
                version: *track,
                summary: summarize(&series.users_series),
            });

            over_transactions
                .entry(metric.as_str())
                .or_default()
                .insert(*track, series.transactions_series.clone());
            over_users
                .entry(metric.as_str())
                .or_default()
                .insert(*track, series.users_series.clone());
        }
    }

    for (metric, by_track) in &over_transactions {
        if let Some(entry) = dashboard.get_mut(*metric) {
            entry.histograms_over_transactions =
                calculate_histogram(by_track, DEFAULT_BUCKETS, DEFAULT_DECIMAL_PLACES);
        }
    }
    for (metric, by_track) in &over_users {
        if let Some(entry) = dashboard.get_mut(*metric) {
            entry.histograms_over_users =
                calculate_histogram(by_track, DEFAULT_BUCKETS, DEFAULT_DECIMAL_PLACES);
        }
    }

    debug!(
        tracks = versions.len(),
        metrics = dashboard.len(),
        "dashboard built"
    );
    dashboard
}
