use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use crate::plan::{IndexingPlan, PlanReport};

/// A connection-like resource that applies plans to an index.
#[async_trait]
pub trait IndexSession: Send + Sync {
    /// Apply the plan. `Err` means the plan as a whole failed; per-entry
    /// failures go in the report.
    async fn execute(&self, plan: &IndexingPlan) -> anyhow::Result<PlanReport>;

    fn close(&self) -> anyhow::Result<()>;
}

pub trait SessionFactory: Send + Sync + 'static {
    fn open(&self) -> anyhow::Result<Arc<dyn IndexSession>>;
}

/// The session a processor currently holds, shared with its in-flight batch.
#[derive(Clone, Default)]
pub(crate) struct SessionSlot {
    inner: Arc<Mutex<Option<Arc<dyn IndexSession>>>>,
}

impl SessionSlot {
    pub fn current(&self) -> Option<Arc<dyn IndexSession>> {
        self.inner.lock().clone()
    }

    pub fn get_or_open(&self, factory: &dyn SessionFactory) -> anyhow::Result<Arc<dyn IndexSession>> {
        let mut slot = self.inner.lock();
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = factory.open()?;
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Close the held session, if any.
    pub fn release(&self) {
        let session = self.inner.lock().take();
        if let Some(session) = session {
            close(&*session);
        }
    }

    /// Close `session` only if it is still the one held.
    pub fn release_if(&self, session: &Arc<dyn IndexSession>) {
        let taken = {
            let mut slot = self.inner.lock();
            match slot.as_ref() {
                Some(held) if Arc::ptr_eq(held, session) => slot.take(),
                _ => None,
            }
        };
        if let Some(session) = taken {
            close(&*session);
        }
    }
}

fn close(session: &dyn IndexSession) {
    if let Err(e) = session.close() {
        warn!(error = %e, "failed to close index session");
    }
}
