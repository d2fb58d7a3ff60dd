//! Error types shared by the splitway core types.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid application key '{0}': expected '<namespace>/<name>' or '<name>'")]
    InvalidApplicationKey(String),
}
