use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchError {
    #[error("batching executor '{0}' is already started")]
    AlreadyStarted(String),
    #[error("batching executor '{0}' is draining and rejects new work")]
    Rejected(String),
    #[error("batching executor '{0}' stopped before the work was processed")]
    Stopped(String),
    #[error("work dispatch failed: {0}")]
    Dispatch(Arc<anyhow::Error>),
}
