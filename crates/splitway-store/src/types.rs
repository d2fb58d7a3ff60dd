//! Aggregated metric types returned by the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Values recorded for one metric of one track generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    /// One entry per recorded transaction.
    pub transactions_series: Vec<f64>,
    /// One entry per registered user: the sum of that user's transactions,
    /// or zero for users who never reported this metric.
    pub users_series: Vec<f64>,
}

impl MetricSeries {
    pub(crate) fn pad_users(&mut self, user_count: usize) {
        if self.users_series.len() < user_count {
            self.users_series.resize(user_count, 0.0);
        }
    }
}

/// All metrics of one (application, track, signature), keyed by metric name.
pub type VersionMetrics = BTreeMap<String, MetricSeries>;
