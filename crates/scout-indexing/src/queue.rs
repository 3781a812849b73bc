use std::future::Future;
use std::sync::Arc;

use scout_batch::{BatchSettings, BatchingExecutor};
use scout_tenancy::MultiTenancyStrategy;
use serde_json::Value;

use crate::error::IndexingError;
use crate::event::IndexingEvent;
use crate::processor::IndexingQueueProcessor;
use crate::session::SessionFactory;
use crate::work::{IndexingHandle, IndexingWork};

/// Background indexing for one entity type.
pub struct IndexingQueue {
    executor: BatchingExecutor<IndexingQueueProcessor>,
    tenancy: Arc<dyn MultiTenancyStrategy>,
}

impl IndexingQueue {
    /// Batches always run in order here, whatever `settings` says.
    pub fn new(
        name: impl Into<String>,
        factory: Arc<dyn SessionFactory>,
        tenancy: Arc<dyn MultiTenancyStrategy>,
        settings: BatchSettings,
    ) -> Self {
        let settings = BatchSettings {
            preserve_order: true,
            ..settings
        };
        Self {
            executor: BatchingExecutor::new(name, IndexingQueueProcessor::new(factory), settings),
            tenancy,
        }
    }

    pub async fn start(&self) -> Result<(), IndexingError> {
        Ok(self.executor.start().await?)
    }

    /// Queue an event. Tenant ids are checked before anything is queued.
    pub async fn submit(&self, event: IndexingEvent) -> Result<IndexingHandle, IndexingError> {
        self.tenancy
            .check_tenant_id(event.tenant_id.as_deref(), &event.describe())?;
        let (work, handle) = IndexingWork::new(event);
        self.executor.submit(work).await?;
        Ok(handle)
    }

    pub async fn add(
        &self,
        entity_name: &str,
        id: &str,
        document: Value,
    ) -> Result<IndexingHandle, IndexingError> {
        self.submit(IndexingEvent::add(entity_name, id, document)).await
    }

    pub async fn add_or_update(
        &self,
        entity_name: &str,
        id: &str,
        document: Value,
    ) -> Result<IndexingHandle, IndexingError> {
        self.submit(IndexingEvent::add_or_update(entity_name, id, document))
            .await
    }

    pub async fn delete(&self, entity_name: &str, id: &str) -> Result<IndexingHandle, IndexingError> {
        self.submit(IndexingEvent::delete(entity_name, id)).await
    }

    pub fn pending(&self) -> usize {
        self.executor.pending()
    }

    pub fn completion(&self) -> impl Future<Output = ()> + Send + 'static {
        self.executor.completion()
    }

    /// Refuse new events, wait for queued ones, then stop.
    pub async fn shutdown(&self) {
        self.executor.pre_stop().await;
        self.executor.stop().await;
    }
}
