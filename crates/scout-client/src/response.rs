use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use serde_json::Value;

use crate::error::ClientError;

/// A reply exactly as the transport received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub host: String,
    pub status: u16,
    pub reason: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(host: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status,
            reason: reason.into(),
            content_type: None,
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body.into();
        self
    }
}

/// Result of a call, whatever its status code.
///
/// Whether a status is an application error is up to the caller: a 404 on a
/// delete usually is not.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    host: String,
    status_code: u16,
    status_text: String,
    body: Option<Value>,
}

impl Response {
    pub fn new(host: String, status_code: u16, status_text: String, body: Option<Value>) -> Self {
        Self {
            host,
            status_code,
            status_text,
            body,
        }
    }

    /// Decode the entity with the charset of its content type (UTF-8 when
    /// unspecified) and parse it as JSON. An empty entity gives no body.
    pub fn from_raw(raw: RawResponse) -> Result<Self, ClientError> {
        let body = if raw.body.is_empty() {
            None
        } else {
            let encoding = charset(raw.content_type.as_deref());
            let (text, _, _) = encoding.decode(&raw.body);
            match serde_json::from_str::<Value>(&text) {
                Ok(v) => Some(v),
                Err(e) => {
                    return Err(ClientError::ResponseParse {
                        status: raw.status,
                        reason: raw.reason,
                        message: e.to_string(),
                    })
                }
            }
        };
        Ok(Self::new(raw.host, raw.status, raw.reason, body))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<Value> {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

fn charset(content_type: Option<&str>) -> &'static Encoding {
    content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .and_then(|m| {
            m.get_param(mime::CHARSET)
                .and_then(|label| Encoding::for_label(label.as_str().as_bytes()))
        })
        .unwrap_or(UTF_8)
}
