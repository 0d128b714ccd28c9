//! Server → Client push events

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Notification;

/// Events pushed from server to client over the realtime channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Handshake ack, informational
    Connected,

    // Notification feed
    Notification {
        notification: Notification,
    },
    UnreadCount {
        count: u64,
    },
    NotificationMarkedRead {
        notification_id: String,
    },
    NotificationsMarkedRead {
        notification_ids: Vec<String>,
    },

    // Authorization-change broadcasts. Payloads are open bags: the
    // admin console attaches whatever context it has (message, actor,
    // affected grants), none of which the client interprets beyond
    // `message`.
    PermissionsUpdated {
        #[serde(default)]
        message: Option<String>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    TenancyFeaturesUpdated {
        #[serde(default)]
        message: Option<String>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    TenancyPermissionsUpdated {
        #[serde(default)]
        message: Option<String>,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },

    // Errors are logged only, never surfaced
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}
