//! Routing error types.

use splitway_core::{ApplicationKey, ResourceRef, Track};
use thiserror::Error;

pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routemap {0} declares no variants")]
    NoVariants(ApplicationKey),

    #[error("routemap {app}: resource {resource} is outside namespace {namespace}")]
    ForeignNamespace {
        app: ApplicationKey,
        resource: ResourceRef,
        namespace: String,
    },

    #[error("routemap {app}: track {track} cannot be reassigned or removed; variants are append-only")]
    TrackReassigned { app: ApplicationKey, track: Track },
}
