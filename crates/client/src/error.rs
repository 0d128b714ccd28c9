//! Internal error taxonomy.
//!
//! Nothing here crosses the public API: every failure path in the
//! manager terminates in a no-op, a log line, or a scheduled fallback.
//! The enum exists so internal fallible paths can use `?` and log one
//! well-typed error at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http status {0}")]
    Status(u16),

    #[error("session store i/o: {0}")]
    Store(#[from] std::io::Error),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Profile endpoint answered but the body was unusable
    /// (success=false, missing data, or all three fields absent).
    #[error("profile response rejected")]
    ProfileRejected,

    /// No readable token in the session store.
    #[error("no credential")]
    NoCredential,
}

impl ClientError {
    /// True for 401 responses, which the refetch path swallows quietly
    /// (session-expiry redirects are the host app's job).
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ClientError::Status(code) => *code == 401,
            ClientError::Http(e) => e.status().map(|s| s.as_u16()) == Some(401),
            _ => false,
        }
    }
}
