pub mod config;
pub mod error;
pub mod types;

pub use config::ServiceConfig;
pub use error::{CoreError, CoreResult};
pub use types::*;
