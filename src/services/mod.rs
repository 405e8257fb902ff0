//! Multi-step operations composed over the store and the adapters.
//!
//! Everything here takes explicit caller context (organization id, user id)
//! as parameters; there is no ambient identity.

pub mod briefs;
pub mod content;
pub mod schedules;
pub mod uploads;

use crate::db::DbError;
use crate::ingestion::IngestError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed or missing arguments, rejected before any write.
    #[error("validation: {0}")]
    Validation(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl ServiceError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }
}
