use std::collections::HashMap;

use serde_json::Value;

use crate::event::{EventKind, IndexingEvent};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    entity_name: String,
    tenant_id: Option<String>,
    id: String,
}

/// The net change for one document within a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub kind: EventKind,
    pub entity_name: String,
    pub id: String,
    pub routing: Option<String>,
    pub tenant_id: Option<String>,
    pub document: Option<Value>,
}

/// Work of one batch. Events on the same document collapse into one entry.
#[derive(Debug, Default)]
pub struct IndexingPlan {
    entries: Vec<PlanEntry>,
    positions: HashMap<EntryKey, usize>,
}

impl IndexingPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event and return the index of the entry it landed in.
    pub fn add(&mut self, event: IndexingEvent) -> usize {
        let key = EntryKey {
            entity_name: event.entity_name.clone(),
            tenant_id: event.tenant_id.clone(),
            id: event.id.clone(),
        };
        if let Some(&pos) = self.positions.get(&key) {
            merge(&mut self.entries[pos], event);
            return pos;
        }

        let pos = self.entries.len();
        self.entries.push(PlanEntry {
            kind: event.kind,
            entity_name: event.entity_name,
            id: event.id,
            routing: event.routing,
            tenant_id: event.tenant_id,
            document: event.document,
        });
        self.positions.insert(key, pos);
        pos
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn merge(entry: &mut PlanEntry, later: IndexingEvent) {
    entry.kind = match (entry.kind, later.kind) {
        (EventKind::Add, EventKind::Delete) => EventKind::Delete,
        // The document may exist in the index from before the delete.
        (EventKind::Delete, EventKind::Add | EventKind::AddOrUpdate) => EventKind::AddOrUpdate,
        (_, kind) => kind,
    };
    entry.document = match entry.kind {
        EventKind::Delete => None,
        _ => later.document,
    };
    if later.routing.is_some() {
        entry.routing = later.routing;
    }
}

/// Outcome of executing a plan, per entry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlanReport {
    failures: HashMap<usize, String>,
}

impl PlanReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_entry(&mut self, entry: usize, reason: impl Into<String>) {
        self.failures.insert(entry, reason.into());
    }

    /// Why the entry failed, `None` if it succeeded.
    pub fn failure(&self, entry: usize) -> Option<&str> {
        self.failures.get(&entry).map(String::as_str)
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}
