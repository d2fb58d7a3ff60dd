//! splitway-metrics: cross-version metric analysis for splitway.
//!
//! Turns the per-track series produced by the metric store into summaries
//! and histograms that can be compared across variants.
//!
//! # Architecture
//!
//! ```text
//! VersionMetrics (per track)
//!   ├── summarize() → SummarizedMetric per series
//!   ├── calculate_histogram() → buckets on shared edges across tracks
//!   ├── build_dashboard() → per-metric summaries + histograms
//!   └── export_application() → legacy fixed-array snapshot
//! ```

pub mod dashboard;
pub mod histogram;
pub mod legacy;
pub mod summary;

pub use dashboard::{Dashboard, MetricSummary, VersionSummary, build_dashboard};
pub use histogram::{HistogramBucket, calculate_histogram};
pub use legacy::{LegacyApplication, LegacyVersion, export_application};
pub use summary::{SummarizedMetric, SummaryStatistic, summarize};
