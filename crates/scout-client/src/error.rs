use scout_common::TimeoutError;

use crate::response::RawResponse;

/// Failure reported by a [`Transport`](crate::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport received a complete reply but classified its status as an
    /// error. The executor resolves the call with this reply anyway.
    #[error("reply rejected with status {}", .0.status)]
    Rejected(Box<RawResponse>),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Configuration(String),
    #[error("failed to serialize request body: {0}")]
    Serialization(String),
    #[error("request to {host} failed: {source}")]
    Transport {
        host: String,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("failed to parse response body (status {status} {reason}): {message}")]
    ResponseParse {
        status: u16,
        reason: String,
        message: String,
    },
    #[error("request was abandoned before completion")]
    Abandoned,
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }

    pub fn timeout(&self) -> Option<&TimeoutError> {
        match self {
            ClientError::Timeout(t) => Some(t),
            _ => None,
        }
    }
}
