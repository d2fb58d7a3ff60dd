//! splitway-service: the request-facing façade over routing and metrics.
//!
//! # Architecture
//!
//! ```text
//! RoutingService
//!   ├── Routemaps (per-application weight tables)
//!   │     └── reconciled from a ResourceInspector
//!   ├── MetricStore (embedded redb or remote Redis)
//!   └── run(): periodic reconcile + expiry purge until shutdown
//! ```
//!
//! Transport layers call [`RoutingService::lookup`] to pick a track for a
//! user and [`RoutingService::write_metric`] to record transaction outcomes
//! against the generation the user was routed to.

pub mod error;
pub mod service;
pub mod telemetry;

pub use error::{ServiceError, ServiceResult};
pub use service::RoutingService;
pub use telemetry::init_tracing;
