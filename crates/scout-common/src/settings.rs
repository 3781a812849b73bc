use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings of the HTTP request executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URLs of the search nodes, e.g. `http://127.0.0.1:9200`.
    pub hosts: Vec<String>,
    /// Client-side timeout applied to requests that carry no deadline.
    pub request_timeout_ms: Option<u64>,
    pub connect_timeout_ms: u64,
    pub max_idle_connections_per_host: usize,
    pub idle_timeout_ms: u64,
    /// Emit a `scout::request` event per call.
    pub log_requests: bool,
    /// Successful calls slower than this are logged at INFO instead of TRACE.
    pub slow_request_threshold_ms: u64,
    /// Maximum number of characters of a rendered body in request logs.
    pub log_body_limit: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            hosts: vec!["http://127.0.0.1:9200".to_string()],
            request_timeout_ms: None,
            connect_timeout_ms: 1_000,
            max_idle_connections_per_host: 10,
            idle_timeout_ms: 90_000,
            log_requests: true,
            slow_request_threshold_ms: 1_000,
            log_body_limit: 1_024,
        }
    }
}

impl ClientSettings {
    pub fn from_env() -> Self {
        let mut s = Self::default();
        if let Some(hosts) = env_var::<String>("SCOUT_HOSTS") {
            s.hosts = hosts
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }
        s.request_timeout_ms = env_var("SCOUT_REQUEST_TIMEOUT_MS").or(s.request_timeout_ms);
        s.connect_timeout_ms = env_var("SCOUT_CONNECT_TIMEOUT_MS").unwrap_or(s.connect_timeout_ms);
        s.max_idle_connections_per_host =
            env_var("SCOUT_MAX_IDLE_CONNECTIONS_PER_HOST").unwrap_or(s.max_idle_connections_per_host);
        s.idle_timeout_ms = env_var("SCOUT_IDLE_TIMEOUT_MS").unwrap_or(s.idle_timeout_ms);
        s.log_requests = env_var("SCOUT_LOG_REQUESTS").unwrap_or(s.log_requests);
        s.slow_request_threshold_ms =
            env_var("SCOUT_SLOW_REQUEST_THRESHOLD_MS").unwrap_or(s.slow_request_threshold_ms);
        s.log_body_limit = env_var("SCOUT_LOG_BODY_LIMIT").unwrap_or(s.log_body_limit);
        s
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_threshold_ms)
    }
}

/// Settings of one batching pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub max_batch_size: usize,
    /// Wait for each batch to finish before starting the next one.
    pub preserve_order: bool,
    /// `None` for an unbounded queue; `Some(n)` makes producers wait for space.
    pub queue_capacity: Option<usize>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            preserve_order: true,
            queue_capacity: None,
        }
    }
}

impl BatchSettings {
    pub fn from_env() -> Self {
        let mut s = Self::default();
        s.max_batch_size = env_var("SCOUT_MAX_BATCH_SIZE").unwrap_or(s.max_batch_size);
        s.preserve_order = env_var("SCOUT_PRESERVE_ORDER").unwrap_or(s.preserve_order);
        s.queue_capacity = env_var("SCOUT_QUEUE_CAPACITY").or(s.queue_capacity);
        s
    }
}

/// Settings selecting the multi-tenancy strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenancySettings {
    /// `none` or `discriminator`.
    pub strategy: String,
    pub id_field: String,
    pub tenant_field: String,
}

impl Default for TenancySettings {
    fn default() -> Self {
        Self {
            strategy: "none".to_string(),
            id_field: "_tenant_doc_id".to_string(),
            tenant_field: "_tenant_id".to_string(),
        }
    }
}

impl TenancySettings {
    pub fn from_env() -> Self {
        let mut s = Self::default();
        s.strategy = env_var("SCOUT_TENANCY_STRATEGY").unwrap_or(s.strategy);
        s.id_field = env_var("SCOUT_TENANCY_ID_FIELD").unwrap_or(s.id_field);
        s.tenant_field = env_var("SCOUT_TENANCY_TENANT_FIELD").unwrap_or(s.tenant_field);
        s
    }
}

fn env_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(name, value=%raw, "ignoring unparsable environment override");
            None
        }
    }
}
