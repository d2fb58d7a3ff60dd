//! splitway-store: metric storage for splitway.
//!
//! Records one key per (application, track, signature, metric, user,
//! transaction) plus one presence key per user, and aggregates them back into
//! per-metric series for a given track generation.
//!
//! # Architecture
//!
//! [`KvBackend`] is the only seam a storage engine implements: put, get, and
//! an ordered prefix scan. Two engines ship with the crate:
//!
//! - [`EmbeddedBackend`], a single-file [redb](https://docs.rs/redb) database
//!   with per-entry expiry headers.
//! - [`RemoteBackend`], a Redis-compatible server reached over a synchronous
//!   connection. Pattern scans stand in for the ordered iterator and keys are
//!   sorted client-side.
//!
//! [`MetricStore`] owns the key codec and the aggregation scan, so both engines
//! produce identical output for the same write sequence.

pub mod backend;
pub mod codec;
pub mod embedded;
pub mod error;
pub mod remote;
pub mod store;
pub mod tables;
pub mod types;

pub use backend::KvBackend;
pub use codec::{KeyCodec, MetricKey, UserKey};
pub use embedded::EmbeddedBackend;
pub use error::{StoreError, StoreResult};
pub use remote::RemoteBackend;
pub use store::MetricStore;
pub use types::*;
