use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use scout_common::ClientSettings;

use crate::error::TransportError;
use crate::request::Method;
use crate::response::RawResponse;

pub const JSON: &str = "application/json";
pub const NDJSON: &str = "application/x-ndjson";

/// Serialized request body.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub content_type: &'static str,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub host: String,
    pub path: String,
    pub parameters: Vec<(String, String)>,
    pub entity: Option<Entity>,
    /// Read timeout of this attempt, derived from the request deadline.
    pub socket_timeout: Option<Duration>,
}

/// Ships one request to a node and returns the reply, whatever its status.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

/// Pooled HTTP transport.
///
/// reqwest opens a new connection when no idle pooled one is available, so a
/// request never waits for a pool lease.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: &ClientSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .pool_max_idle_per_host(settings.max_idle_connections_per_host)
            .pool_idle_timeout(settings.idle_timeout())
            .build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", request.host.trim_end_matches('/'), request.path);
        let mut builder = self.http.request(request.method.into(), url);
        if !request.parameters.is_empty() {
            builder = builder.query(&request.parameters);
        }
        if let Some(entity) = request.entity {
            builder = builder
                .header(CONTENT_TYPE, entity.content_type)
                .body(entity.bytes);
        }
        if let Some(timeout) = request.socket_timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await?;

        Ok(RawResponse {
            host: request.host,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            content_type,
            body,
        })
    }
}
