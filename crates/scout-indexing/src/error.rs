use std::sync::Arc;

use scout_batch::BatchError;
use scout_tenancy::TenancyError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexingError {
    #[error("indexing {entity_name} '{id}' failed: {reason}")]
    Entry {
        entity_name: String,
        id: String,
        reason: String,
    },
    /// The whole plan of the batch failed; every item shares the cause.
    #[error("indexing plan failed: {0}")]
    Plan(Arc<anyhow::Error>),
    #[error(transparent)]
    Queue(#[from] BatchError),
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
    #[error("indexing work was dropped before completion")]
    Abandoned,
}
