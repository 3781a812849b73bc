use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Create a document that must not exist yet.
    Add,
    AddOrUpdate,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::AddOrUpdate => "add_or_update",
            Self::Delete => "delete",
        })
    }
}

/// One queued change to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub entity_name: String,
    pub id: String,
    /// Identifier in the form the application persisted it.
    #[serde(default)]
    pub serialized_id: Vec<u8>,
    #[serde(default)]
    pub routing: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub document: Option<Value>,
}

impl IndexingEvent {
    fn new(kind: EventKind, entity_name: &str, id: &str, document: Option<Value>) -> Self {
        Self {
            kind,
            entity_name: entity_name.to_string(),
            id: id.to_string(),
            serialized_id: id.as_bytes().to_vec(),
            routing: None,
            tenant_id: None,
            document,
        }
    }

    pub fn add(entity_name: &str, id: &str, document: Value) -> Self {
        Self::new(EventKind::Add, entity_name, id, Some(document))
    }

    pub fn add_or_update(entity_name: &str, id: &str, document: Value) -> Self {
        Self::new(EventKind::AddOrUpdate, entity_name, id, Some(document))
    }

    pub fn delete(entity_name: &str, id: &str) -> Self {
        Self::new(EventKind::Delete, entity_name, id, None)
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_serialized_id(mut self, serialized_id: Vec<u8>) -> Self {
        self.serialized_id = serialized_id;
        self
    }

    /// Short description for errors and logs.
    pub fn describe(&self) -> String {
        format!("{} of {} '{}'", self.kind, self.entity_name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_parses_from_json_line() {
        let line = r#"{"kind":"add_or_update","entity_name":"books","id":"7","document":{"title":"Dune"}}"#;
        let event: IndexingEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.kind, EventKind::AddOrUpdate);
        assert_eq!(event.document, Some(json!({"title": "Dune"})));
        assert!(event.tenant_id.is_none());
    }

    #[test]
    fn test_builders() {
        let event = IndexingEvent::delete("books", "7").with_tenant("acme").with_routing("r1");
        assert_eq!(event.serialized_id, b"7");
        assert_eq!(event.describe(), "delete of books '7'");
        assert_eq!(event.routing.as_deref(), Some("r1"));
    }
}
