//! Applies queued indexing events batch by batch.
//!
//! Run it on a `BatchingExecutor` that preserves order: one session is held
//! across consecutive batches and released whenever the queue runs empty.

use std::sync::Arc;

use scout_batch::{BatchFuture, BatchedWorkProcessor};
use tracing::{debug, warn};

use crate::error::IndexingError;
use crate::event::IndexingEvent;
use crate::plan::IndexingPlan;
use crate::session::{SessionFactory, SessionSlot};
use crate::work::Completion;

pub struct IndexingQueueProcessor {
    factory: Arc<dyn SessionFactory>,
    session: SessionSlot,
    plan: IndexingPlan,
    /// (plan entry, completion) per accepted event.
    waiters: Vec<(usize, Completion)>,
}

impl IndexingQueueProcessor {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            session: SessionSlot::default(),
            plan: IndexingPlan::new(),
            waiters: Vec::new(),
        }
    }

    pub(crate) fn ensure_session(&mut self) -> anyhow::Result<()> {
        self.session.get_or_open(&*self.factory).map(|_| ())
    }

    pub(crate) fn push(&mut self, event: IndexingEvent, done: Completion) {
        let entry = self.plan.add(event);
        self.waiters.push((entry, done));
    }
}

impl BatchedWorkProcessor for IndexingQueueProcessor {
    fn begin_batch(&mut self) {
        self.plan = IndexingPlan::new();
        self.waiters.clear();
    }

    fn end_batch(&mut self) -> BatchFuture {
        let plan = std::mem::take(&mut self.plan);
        let waiters = std::mem::take(&mut self.waiters);
        let slot = self.session.clone();

        Box::pin(async move {
            if waiters.is_empty() {
                return;
            }
            let Some(session) = slot.current() else {
                let cause = Arc::new(anyhow::anyhow!("no index session for the batch"));
                for (_, done) in waiters {
                    done.finish(Err(IndexingError::Plan(cause.clone())));
                }
                return;
            };

            match session.execute(&plan).await {
                Ok(report) => {
                    debug!(
                        entries = plan.len(),
                        events = waiters.len(),
                        failed = report.failed_count(),
                        "indexing plan executed"
                    );
                    for (entry, done) in waiters {
                        let result = match report.failure(entry) {
                            None => Ok(()),
                            Some(reason) => {
                                let e = &plan.entries()[entry];
                                Err(IndexingError::Entry {
                                    entity_name: e.entity_name.clone(),
                                    id: e.id.clone(),
                                    reason: reason.to_string(),
                                })
                            }
                        };
                        done.finish(result);
                    }
                }
                Err(e) => {
                    warn!(error = %e, entries = plan.len(), "indexing plan failed");
                    slot.release_if(&session);
                    let cause = Arc::new(e);
                    for (_, done) in waiters {
                        done.finish(Err(IndexingError::Plan(cause.clone())));
                    }
                }
            }
        })
    }

    fn complete(&mut self) {
        self.session.release();
    }
}
