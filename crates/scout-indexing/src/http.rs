//! Sessions that apply plans through the bulk API of a search node.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use scout_client::{AsyncRequestExecutor, Deadline, Request};
use scout_tenancy::MultiTenancyStrategy;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::event::EventKind;
use crate::plan::{IndexingPlan, PlanEntry, PlanReport};
use crate::session::{IndexSession, SessionFactory};

#[derive(Clone)]
pub struct HttpSessionFactory {
    executor: AsyncRequestExecutor,
    tenancy: Arc<dyn MultiTenancyStrategy>,
    /// Budget for one bulk request, if any.
    timeout: Option<Duration>,
    refresh: bool,
}

impl HttpSessionFactory {
    pub fn new(executor: AsyncRequestExecutor, tenancy: Arc<dyn MultiTenancyStrategy>) -> Self {
        Self {
            executor,
            tenancy,
            timeout: None,
            refresh: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ask the node to refresh after each plan so changes are searchable at once.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

impl SessionFactory for HttpSessionFactory {
    fn open(&self) -> anyhow::Result<Arc<dyn IndexSession>> {
        Ok(Arc::new(HttpIndexSession {
            factory: self.clone(),
        }))
    }
}

/// Connections are pooled by the executor, so a session holds nothing of its own.
pub struct HttpIndexSession {
    factory: HttpSessionFactory,
}

impl HttpIndexSession {
    /// Action line and optional source line of one entry.
    fn lines(&self, entry: &PlanEntry) -> Result<(Value, Option<Value>), String> {
        let tenancy = &self.factory.tenancy;
        let tenant = entry.tenant_id.as_deref();
        let backend_id = tenancy
            .to_backend_id(tenant, &entry.id)
            .map_err(|e| e.to_string())?;

        let mut meta = Map::new();
        meta.insert("_index".to_string(), Value::from(entry.entity_name.as_str()));
        meta.insert("_id".to_string(), Value::from(backend_id));
        if let Some(routing) = &entry.routing {
            meta.insert("routing".to_string(), Value::from(routing.as_str()));
        }

        let action = match entry.kind {
            EventKind::Add => "create",
            EventKind::AddOrUpdate => "index",
            EventKind::Delete => {
                return Ok((json!({ "delete": meta }), None));
            }
        };

        let mut source = match &entry.document {
            Some(Value::Object(doc)) => doc.clone(),
            Some(_) => return Err("document is not a JSON object".to_string()),
            None => return Err("document missing".to_string()),
        };
        let fields = tenancy
            .document_metadata(tenant, &entry.id)
            .map_err(|e| e.to_string())?;
        source.extend(fields);

        let mut line = Map::new();
        line.insert(action.to_string(), Value::Object(meta));
        Ok((Value::Object(line), Some(Value::Object(source))))
    }
}

#[async_trait]
impl IndexSession for HttpIndexSession {
    async fn execute(&self, plan: &IndexingPlan) -> anyhow::Result<PlanReport> {
        let mut report = PlanReport::new();
        let mut builder = Request::post().path_component("_bulk").ndjson();
        // Plan entry of each bulk item, in request order.
        let mut sent = Vec::with_capacity(plan.len());

        for (i, entry) in plan.entries().iter().enumerate() {
            match self.lines(entry) {
                Ok((action, source)) => {
                    builder = builder.body(action);
                    if let Some(source) = source {
                        builder = builder.body(source);
                    }
                    sent.push(i);
                }
                Err(reason) => report.fail_entry(i, reason),
            }
        }
        if sent.is_empty() {
            return Ok(report);
        }

        if self.factory.refresh {
            builder = builder.param("refresh", "true");
        }
        if let Some(timeout) = self.factory.timeout {
            builder = builder.deadline(Deadline::for_duration(timeout));
        }

        let response = self
            .factory
            .executor
            .submit(builder.build())
            .await
            .context("bulk request failed")?;
        if !response.is_success() {
            anyhow::bail!(
                "bulk request rejected with {} {}",
                response.status_code(),
                response.status_text()
            );
        }

        let items = response
            .body()
            .and_then(|b| b.get("items"))
            .and_then(Value::as_array)
            .context("bulk response has no items")?;
        if items.len() != sent.len() {
            anyhow::bail!(
                "bulk response has {} items for {} actions",
                items.len(),
                sent.len()
            );
        }

        for (item, &entry) in items.iter().zip(&sent) {
            if let Some(reason) = item_failure(item, plan.entries()[entry].kind) {
                report.fail_entry(entry, reason);
            }
        }
        debug!(
            actions = sent.len(),
            failed = report.failed_count(),
            "bulk request applied"
        );
        Ok(report)
    }

    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Failure reason of one bulk item, `None` on success.
fn item_failure(item: &Value, kind: EventKind) -> Option<String> {
    let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
        return Some("malformed bulk item".to_string());
    };
    let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
    // Deleting what is already gone is fine.
    if (200..300).contains(&status) || (kind == EventKind::Delete && status == 404) {
        return None;
    }
    let reason = match result.get("error") {
        Some(Value::Object(err)) => err
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(err.clone()).to_string()),
        Some(Value::String(reason)) => reason.clone(),
        _ => format!("status {status}"),
    };
    Some(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_failure() {
        let ok = json!({ "index": { "status": 201 } });
        assert_eq!(item_failure(&ok, EventKind::AddOrUpdate), None);

        let gone = json!({ "delete": { "status": 404, "result": "not_found" } });
        assert_eq!(item_failure(&gone, EventKind::Delete), None);

        let conflict = json!({ "create": { "status": 409, "error": { "type": "version_conflict_engine_exception", "reason": "document already exists" } } });
        assert_eq!(
            item_failure(&conflict, EventKind::Add).as_deref(),
            Some("document already exists")
        );

        let bare = json!({ "index": { "status": 429 } });
        assert_eq!(item_failure(&bare, EventKind::AddOrUpdate).as_deref(), Some("status 429"));
        assert!(item_failure(&json!("x"), EventKind::Add).is_some());
    }
}
