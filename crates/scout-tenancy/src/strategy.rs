use scout_common::TenancySettings;
use serde_json::{json, Map, Value};

use crate::error::TenancyError;

/// How several logical tenants share one physical index.
///
/// Used on the indexing path to compute the stored document id and the
/// fields written next to the source, and on the query path to scope a
/// query to one tenant and recover the caller's id from a hit.
pub trait MultiTenancyStrategy: Send + Sync {
    /// Name for logging and configuration.
    fn name(&self) -> &'static str;

    /// Fail eagerly when `tenant_id` does not fit this strategy.
    fn check_tenant_id(&self, tenant_id: Option<&str>, context: &str) -> Result<(), TenancyError>;

    /// Document id as stored in the backend.
    fn to_backend_id(&self, tenant_id: Option<&str>, id: &str) -> Result<String, TenancyError>;

    /// Add the strategy's own fields to a mapping's `properties`.
    fn contribute_to_mapping(&self, properties: &mut Map<String, Value>);

    /// Fields stored alongside the document source.
    fn document_metadata(
        &self,
        tenant_id: Option<&str>,
        id: &str,
    ) -> Result<Map<String, Value>, TenancyError>;

    /// Query clause restricting hits to one tenant, if any.
    fn filter(&self, tenant_id: Option<&str>) -> Result<Option<Value>, TenancyError>;

    /// The caller's id of a search hit.
    fn extract_id(&self, hit: &Value) -> Option<String>;

    /// Scope `query` to the tenant. A missing query matches every document
    /// of the tenant.
    fn decorate_query(
        &self,
        query: Option<Value>,
        tenant_id: Option<&str>,
    ) -> Result<Option<Value>, TenancyError> {
        let Some(filter) = self.filter(tenant_id)? else {
            return Ok(query);
        };
        let scoped = match query {
            Some(query) => json!({ "bool": { "must": [query], "filter": [filter] } }),
            None => json!({ "bool": { "filter": [filter] } }),
        };
        Ok(Some(scoped))
    }
}

// ---------------------------------------------------------------------------
// NoMultiTenancy — one tenant, ids stored as given
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct NoMultiTenancy;

impl MultiTenancyStrategy for NoMultiTenancy {
    fn name(&self) -> &'static str {
        "none"
    }

    fn check_tenant_id(&self, tenant_id: Option<&str>, context: &str) -> Result<(), TenancyError> {
        match tenant_id {
            None => Ok(()),
            Some(t) => Err(TenancyError::TenantIdNotExpected {
                tenant_id: t.to_string(),
                context: context.to_string(),
            }),
        }
    }

    fn to_backend_id(&self, tenant_id: Option<&str>, id: &str) -> Result<String, TenancyError> {
        self.check_tenant_id(tenant_id, "document id")?;
        Ok(id.to_string())
    }

    fn contribute_to_mapping(&self, _properties: &mut Map<String, Value>) {}

    fn document_metadata(
        &self,
        tenant_id: Option<&str>,
        _id: &str,
    ) -> Result<Map<String, Value>, TenancyError> {
        self.check_tenant_id(tenant_id, "document metadata")?;
        Ok(Map::new())
    }

    fn filter(&self, tenant_id: Option<&str>) -> Result<Option<Value>, TenancyError> {
        self.check_tenant_id(tenant_id, "query")?;
        Ok(None)
    }

    fn extract_id(&self, hit: &Value) -> Option<String> {
        hit.get("_id").and_then(Value::as_str).map(str::to_string)
    }
}

// ---------------------------------------------------------------------------
// DiscriminatorMultiTenancy — tenant id stored in a field, ids prefixed
// ---------------------------------------------------------------------------

pub const DEFAULT_ID_FIELD: &str = "_tenant_doc_id";
pub const DEFAULT_TENANT_FIELD: &str = "_tenant_id";

#[derive(Debug, Clone)]
pub struct DiscriminatorMultiTenancy {
    id_field: String,
    tenant_field: String,
}

impl Default for DiscriminatorMultiTenancy {
    fn default() -> Self {
        Self::new(DEFAULT_ID_FIELD, DEFAULT_TENANT_FIELD)
    }
}

impl DiscriminatorMultiTenancy {
    pub fn new(id_field: impl Into<String>, tenant_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            tenant_field: tenant_field.into(),
        }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn tenant_field(&self) -> &str {
        &self.tenant_field
    }

    fn require<'a>(&self, tenant_id: Option<&'a str>, context: &str) -> Result<&'a str, TenancyError> {
        tenant_id.ok_or_else(|| TenancyError::TenantIdRequired {
            context: context.to_string(),
        })
    }
}

/// Double every `_` so the separator stays unambiguous.
fn escape(s: &str) -> String {
    s.replace('_', "__")
}

impl MultiTenancyStrategy for DiscriminatorMultiTenancy {
    fn name(&self) -> &'static str {
        "discriminator"
    }

    fn check_tenant_id(&self, tenant_id: Option<&str>, context: &str) -> Result<(), TenancyError> {
        self.require(tenant_id, context).map(|_| ())
    }

    fn to_backend_id(&self, tenant_id: Option<&str>, id: &str) -> Result<String, TenancyError> {
        let tenant = self.require(tenant_id, "document id")?;
        Ok(format!("{}_{}", escape(tenant), escape(id)))
    }

    fn contribute_to_mapping(&self, properties: &mut Map<String, Value>) {
        for field in [&self.id_field, &self.tenant_field] {
            properties.insert(field.clone(), json!({ "type": "keyword", "store": true }));
        }
    }

    fn document_metadata(
        &self,
        tenant_id: Option<&str>,
        id: &str,
    ) -> Result<Map<String, Value>, TenancyError> {
        let tenant = self.require(tenant_id, "document metadata")?;
        let mut fields = Map::new();
        fields.insert(self.id_field.clone(), Value::from(id));
        fields.insert(self.tenant_field.clone(), Value::from(tenant));
        Ok(fields)
    }

    fn filter(&self, tenant_id: Option<&str>) -> Result<Option<Value>, TenancyError> {
        let tenant = self.require(tenant_id, "query")?;
        let mut term = Map::new();
        term.insert(self.tenant_field.clone(), Value::from(tenant));
        Ok(Some(json!({ "term": term })))
    }

    fn extract_id(&self, hit: &Value) -> Option<String> {
        if let Some(id) = hit
            .get("_source")
            .and_then(|s| s.get(&self.id_field))
            .and_then(Value::as_str)
        {
            return Some(id.to_string());
        }
        // Stored fields come back as arrays.
        match hit.get("fields").and_then(|f| f.get(&self.id_field))? {
            Value::String(id) => Some(id.clone()),
            Value::Array(values) => values.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }
}

/// Build the strategy named `name`, taking field names from `settings`.
pub fn parse_strategy(
    name: &str,
    settings: &TenancySettings,
) -> Result<Box<dyn MultiTenancyStrategy>, TenancyError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(Box::new(NoMultiTenancy)),
        "discriminator" => Ok(Box::new(DiscriminatorMultiTenancy::new(
            settings.id_field.clone(),
            settings.tenant_field.clone(),
        ))),
        _ => Err(TenancyError::UnknownStrategy(name.to_string())),
    }
}
