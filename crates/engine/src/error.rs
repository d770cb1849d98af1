use stocktrail_core::CoreError;
use stocktrail_storage::StorageError;
use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The remote confirmation failed; the optimistic change has already
    /// been rolled back by the time this is returned.
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("lot not found: {0}")]
    LotNotFound(String),
}
