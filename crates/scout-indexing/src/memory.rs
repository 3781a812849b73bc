use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::event::EventKind;
use crate::plan::{IndexingPlan, PlanReport};
use crate::session::{IndexSession, SessionFactory};

/// (entity, tenant, id)
type DocKey = (String, Option<String>, String);

/// In-process index, shared by every session of a factory.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    docs: Arc<RwLock<BTreeMap<DocKey, Value>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_name: &str, tenant_id: Option<&str>, id: &str) -> Option<Value> {
        let key = (
            entity_name.to_string(),
            tenant_id.map(str::to_string),
            id.to_string(),
        );
        self.docs.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    fn apply(&self, plan: &IndexingPlan) -> PlanReport {
        let mut report = PlanReport::new();
        let mut docs = self.docs.write();
        for (i, entry) in plan.entries().iter().enumerate() {
            let key = (
                entry.entity_name.clone(),
                entry.tenant_id.clone(),
                entry.id.clone(),
            );
            match entry.kind {
                EventKind::Delete => {
                    docs.remove(&key);
                }
                EventKind::Add if docs.contains_key(&key) => {
                    report.fail_entry(i, "document already exists");
                }
                EventKind::Add | EventKind::AddOrUpdate => {
                    docs.insert(key, entry.document.clone().unwrap_or(Value::Null));
                }
            }
        }
        report
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    executed: AtomicUsize,
    fail_plans: AtomicUsize,
}

/// Opens sessions over a [`MemoryIndex`] and counts what they do.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionFactory {
    index: MemoryIndex,
    counters: Arc<Counters>,
}

impl MemorySessionFactory {
    pub fn new(index: MemoryIndex) -> Self {
        Self {
            index,
            counters: Arc::default(),
        }
    }

    pub fn index(&self) -> &MemoryIndex {
        &self.index
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Plans executed, failed ones included.
    pub fn executed(&self) -> usize {
        self.counters.executed.load(Ordering::SeqCst)
    }

    /// Make the next `count` plans fail as a whole.
    pub fn fail_next_plans(&self, count: usize) {
        self.counters.fail_plans.store(count, Ordering::SeqCst);
    }
}

impl SessionFactory for MemorySessionFactory {
    fn open(&self) -> anyhow::Result<Arc<dyn IndexSession>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryIndexSession {
            index: self.index.clone(),
            counters: self.counters.clone(),
        }))
    }
}

pub struct MemoryIndexSession {
    index: MemoryIndex,
    counters: Arc<Counters>,
}

#[async_trait]
impl IndexSession for MemoryIndexSession {
    async fn execute(&self, plan: &IndexingPlan) -> anyhow::Result<PlanReport> {
        self.counters.executed.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .counters
            .fail_plans
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("memory index unavailable");
        }
        Ok(self.index.apply(plan))
    }

    fn close(&self) -> anyhow::Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
