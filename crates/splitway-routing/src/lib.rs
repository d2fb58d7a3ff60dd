//! splitway-routing: decides which variant (track) serves each user.
//!
//! # Architecture
//!
//! ```text
//! Routemaps (namespace → name → Arc<Routemap>)
//!   └── Routemap (own RwLock)
//!         ├── VariantArena   append-only variants, one Track each
//!         ├── reconcile()    ResourceInspector → normalize_weights() [write lock]
//!         └── resolve()      select_track() by rendezvous hashing  [read lock]
//! ```
//!
//! The registry lock only guards inserting and removing routemaps, so
//! traffic for unrelated applications never serializes on one lock.

pub mod error;
pub mod inspector;
pub mod registry;
pub mod rendezvous;
pub mod routemap;
pub mod variant;
pub mod weights;

pub use error::{RoutingError, RoutingResult};
pub use inspector::{ResourceInspector, ResourceStatus, StaticInspector, WEIGHT_ANNOTATION};
pub use registry::Routemaps;
pub use rendezvous::{Candidate, select_track};
pub use routemap::{Resolution, Routemap, RoutemapSnapshot, VariantSnapshot};
pub use variant::VariantArena;
pub use weights::{DEFAULT_WEIGHT, Weighted, normalize_weights};
