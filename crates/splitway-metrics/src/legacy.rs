//! Export to the legacy fixed-array application snapshot.
//!
//! Older consumers read one `[count, sum, min, max, sum_squares]` array per
//! metric and version. Only the per-transaction records are stored; this
//! module derives the arrays from them on demand.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use splitway_core::Track;
use splitway_store::VersionMetrics;

use crate::summary::SummaryStatistic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyVersion {
    pub metrics: BTreeMap<String, [f64; 5]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyApplication {
    /// `namespace/name`
    pub name: String,
    /// Track id → version name. Versions are named after their track.
    pub tracks: BTreeMap<String, String>,
    pub versions: BTreeMap<String, LegacyVersion>,
}

/// Build the legacy snapshot from each track's transaction series.
pub fn export_application(name: &str, versions: &[(Track, VersionMetrics)]) -> LegacyApplication {
    let mut app = LegacyApplication {
        name: name.to_string(),
        ..Default::default()
    };
    for (track, metrics) in versions {
        let id = track.to_string();
        app.tracks.insert(id.clone(), id.clone());
        let metrics = metrics
            .iter()
            .map(|(metric, series)| {
                let stat: SummaryStatistic = series.transactions_series.iter().copied().collect();
                (metric.clone(), stat.to_legacy_array())
            })
            .collect();
        app.versions.insert(id, LegacyVersion { metrics });
    }
    app
}
