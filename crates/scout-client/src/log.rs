//! Per-request tracing under the `scout::request` target.

use std::time::Duration;

use serde_json::Value;
use tracing::Level;

use crate::error::ClientError;
use crate::request::Request;
use crate::response::Response;

/// What is known about a request before it is sent.
#[derive(Debug, Clone)]
pub(crate) struct RequestTrace {
    pub request_id: uuid::Uuid,
    pub method: &'static str,
    pub host: String,
    pub path: String,
    pub parameters: Vec<(String, String)>,
    pub body_parts: usize,
    pub rendered_body: String,
}

impl RequestTrace {
    pub fn new(request: &Request, host: &str, body_limit: usize) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4(),
            method: request.method().as_str(),
            host: host.to_string(),
            path: request.path().to_string(),
            parameters: request.parameters().to_vec(),
            body_parts: request.body_parts().len(),
            rendered_body: render_parts(request.body_parts(), body_limit),
        }
    }
}

pub(crate) fn render_parts(parts: &[Value], limit: usize) -> String {
    let joined = parts
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    truncate(joined, limit)
}

pub(crate) fn truncate(mut s: String, limit: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(limit) {
        s.truncate(idx);
        s.push_str("...");
    }
    s
}

/// Level for a finished call: failures at WARN, slow calls at INFO, the rest at TRACE.
pub(crate) fn level_for(
    result: &Result<Response, ClientError>,
    elapsed: Duration,
    slow_threshold: Duration,
) -> Level {
    match result {
        Err(_) => Level::WARN,
        Ok(r) if r.status_code() >= 400 => Level::WARN,
        Ok(_) if elapsed >= slow_threshold => Level::INFO,
        Ok(_) => Level::TRACE,
    }
}

pub(crate) fn log_completion(
    trace: &RequestTrace,
    result: &Result<Response, ClientError>,
    elapsed: Duration,
    slow_threshold: Duration,
    body_limit: usize,
) {
    let level = level_for(result, elapsed, slow_threshold);
    let enabled = if level == Level::WARN {
        tracing::enabled!(target: "scout::request", Level::WARN)
    } else if level == Level::INFO {
        tracing::enabled!(target: "scout::request", Level::INFO)
    } else {
        tracing::enabled!(target: "scout::request", Level::TRACE)
    };
    if !enabled {
        return;
    }

    let elapsed_ms = elapsed.as_millis() as u64;
    let params = trace
        .parameters
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    match result {
        Ok(resp) => {
            let body = resp
                .body()
                .map(|b| truncate(b.to_string(), body_limit))
                .unwrap_or_default();
            let status = resp.status_code();
            macro_rules! emit {
                ($lvl:ident) => {
                    tracing::$lvl!(
                        target: "scout::request",
                        request_id=%trace.request_id,
                        method=trace.method,
                        host=%trace.host,
                        path=%trace.path,
                        params=%params,
                        body_parts=trace.body_parts,
                        elapsed_ms,
                        status,
                        request_body=%trace.rendered_body,
                        response_body=%body,
                        "search request executed"
                    )
                };
            }
            if level == Level::WARN {
                emit!(warn);
            } else if level == Level::INFO {
                emit!(info);
            } else {
                emit!(trace);
            }
        }
        Err(e) => {
            tracing::warn!(
                target: "scout::request",
                request_id=%trace.request_id,
                method=trace.method,
                host=%trace.host,
                path=%trace.path,
                params=%params,
                body_parts=trace.body_parts,
                elapsed_ms,
                request_body=%trace.rendered_body,
                error=%e,
                "search request failed"
            );
        }
    }
}
