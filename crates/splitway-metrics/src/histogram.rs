//! Histograms on shared bucket edges.
//!
//! Every version is binned over the same `[min, max]` range, taken across all
//! versions, so buckets line up when versions are plotted together.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use splitway_core::Track;

/// Bucket count used when the caller asks for zero buckets.
pub const DEFAULT_BUCKETS: usize = 10;
/// Decimal places dashboards round bucket labels to.
pub const DEFAULT_DECIMAL_PLACES: u32 = 1;

/// Number of samples of one version falling in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub version: String,
    /// Rounded-down edges, e.g. `"8 - 12"`.
    pub bucket: String,
    pub value: u64,
}

fn round_down(x: f64, decimal_places: u32) -> f64 {
    let scale = 10f64.powi(decimal_places as i32);
    (x * scale).floor() / scale
}

fn bucket_label(lower: f64, upper: f64, decimal_places: u32) -> String {
    format!(
        "{} - {}",
        round_down(lower, decimal_places),
        round_down(upper, decimal_places)
    )
}

/// Build one histogram per version with identical bucket edges.
///
/// The global minimum and maximum are binned into each version as two extra
/// samples, then removed again from the first and last buckets. Versions with
/// no samples still get a row of zero buckets. Returns no buckets when no
/// version has samples.
pub fn calculate_histogram(
    per_version: &BTreeMap<Track, Vec<f64>>,
    num_buckets: usize,
    decimal_places: u32,
) -> Vec<HistogramBucket> {
    let buckets = if num_buckets == 0 {
        DEFAULT_BUCKETS
    } else {
        num_buckets
    };

    let mut samples = per_version.values().flatten().copied();
    let Some(first) = samples.next() else {
        return Vec::new();
    };
    let (min, max) = samples.fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x)));

    let buckets = if max <= min { 1 } else { buckets };
    let width = match (max - min) / buckets as f64 {
        w if w > 0.0 => w,
        _ => 1.0,
    };
    let labels: Vec<String> = (0..buckets)
        .map(|i| {
            let lower = min + i as f64 * width;
            let upper = min + (i + 1) as f64 * width;
            bucket_label(lower, upper, decimal_places)
        })
        .collect();

    let mut out = Vec::with_capacity(per_version.len() * buckets);
    for (track, values) in per_version {
        let mut counts = vec![0u64; buckets];
        for &x in values.iter().chain([min, max].iter()) {
            let bin = if x >= max {
                buckets - 1
            } else {
                (((x - min) / width) as usize).min(buckets - 1)
            };
            counts[bin] += 1;
        }
        counts[0] -= 1;
        counts[buckets - 1] -= 1;

        let version = track.to_string();
        for (label, count) in labels.iter().zip(counts) {
            out.push(HistogramBucket {
                version: version.clone(),
                bucket: label.clone(),
                value: count,
            });
        }
    }
    out
}
