use futures_util::future::BoxFuture;

use crate::error::BatchError;

/// Completes when a batch handed over by [`BatchedWorkProcessor::end_batch`] is done.
pub type BatchFuture = BoxFuture<'static, ()>;

/// Receives the work of one pipeline, one batch at a time.
///
/// Only ever called from the pipeline's single processing task, so
/// implementations need no locking of their own.
pub trait BatchedWorkProcessor: Send + 'static {
    fn begin_batch(&mut self);

    /// Close the current batch. The pipeline waits for the returned future
    /// before the next batch when it preserves order.
    fn end_batch(&mut self) -> BatchFuture;

    /// Called whenever the queue runs empty. Release idle resources here.
    fn complete(&mut self);
}

/// One unit of work submitted to a [`BatchingExecutor`](crate::BatchingExecutor).
///
/// Exactly one of two things happens to every item: `submit_to` returns
/// `Ok`, handing it to the processor, or `mark_as_failed` is called.
pub trait BatchedWork<P>: Send + 'static {
    fn submit_to(&mut self, processor: &mut P) -> anyhow::Result<()>;

    fn mark_as_failed(&mut self, cause: BatchError);
}
