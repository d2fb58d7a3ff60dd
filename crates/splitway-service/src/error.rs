//! Service error types.

use splitway_core::{ApplicationKey, CoreError, Track};
use splitway_routing::RoutingError;
use splitway_store::StoreError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing user identifier")]
    MissingUser,

    #[error(transparent)]
    InvalidApplication(#[from] CoreError),

    #[error("application not found: {0}")]
    ApplicationNotFound(ApplicationKey),

    #[error("no routable variant for {0}: every track has weight zero")]
    NoRoutableVariant(ApplicationKey),

    #[error("track {track} of {app} has not been observed yet; refusing to record metrics")]
    UnknownVersion { app: ApplicationKey, track: Track },

    #[error("invalid metric value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },

    #[error("failed to generate transaction id: {0}")]
    TransactionId(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

impl ServiceError {
    /// Whether the caller may retry the request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::NoRoutableVariant(_) => true,
            ServiceError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}
