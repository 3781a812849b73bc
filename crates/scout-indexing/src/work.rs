use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use scout_batch::{BatchError, BatchedWork};
use tokio::sync::oneshot;

use crate::error::IndexingError;
use crate::event::IndexingEvent;
use crate::processor::IndexingQueueProcessor;

/// Fires once with the outcome of one event.
#[derive(Debug)]
pub(crate) struct Completion(oneshot::Sender<Result<(), IndexingError>>);

impl Completion {
    pub fn finish(self, result: Result<(), IndexingError>) {
        // The caller may have stopped waiting.
        let _ = self.0.send(result);
    }
}

/// An event queued for indexing.
#[derive(Debug)]
pub struct IndexingWork {
    event: Option<IndexingEvent>,
    done: Option<Completion>,
}

impl IndexingWork {
    pub fn new(event: IndexingEvent) -> (Self, IndexingHandle) {
        let (tx, rx) = oneshot::channel();
        let work = Self {
            event: Some(event),
            done: Some(Completion(tx)),
        };
        (work, IndexingHandle { rx })
    }
}

impl BatchedWork<IndexingQueueProcessor> for IndexingWork {
    fn submit_to(&mut self, processor: &mut IndexingQueueProcessor) -> anyhow::Result<()> {
        processor.ensure_session()?;
        let (Some(event), Some(done)) = (self.event.take(), self.done.take()) else {
            anyhow::bail!("indexing work submitted twice");
        };
        processor.push(event, done);
        Ok(())
    }

    fn mark_as_failed(&mut self, cause: BatchError) {
        if let Some(done) = self.done.take() {
            done.finish(Err(IndexingError::Queue(cause)));
        }
    }
}

/// Resolves when the event has been applied to the index or has failed.
#[derive(Debug)]
pub struct IndexingHandle {
    rx: oneshot::Receiver<Result<(), IndexingError>>,
}

impl Future for IndexingHandle {
    type Output = Result<(), IndexingError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(IndexingError::Abandoned)))
    }
}
