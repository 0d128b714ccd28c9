//! Washport realtime protocol
//!
//! Shared types for the notification channel between the washport
//! backend and its clients. Everything here is serialized as JSON,
//! camelCase on the wire to match the backend contract.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::ClientEvent;
pub use server::ServerEvent;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as epoch milliseconds
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
