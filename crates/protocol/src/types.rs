//! Core types shared across the protocol

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Notification severity - drives sound/visual treatment on the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

/// Notification category.
///
/// Open set: the backend may introduce new kinds at any time, so
/// anything unrecognized deserializes as `Other` and is handled as a
/// generic alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Alert,
    PermissionUpdate,
    TenancyFeatureUpdate,
    TenancyPermissionUpdate,
    Other,
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "alert" => NotificationKind::Alert,
            "permission_update" => NotificationKind::PermissionUpdate,
            "tenancy_feature_update" => NotificationKind::TenancyFeatureUpdate,
            "tenancy_permission_update" => NotificationKind::TenancyPermissionUpdate,
            _ => NotificationKind::Other,
        })
    }
}

impl Default for NotificationKind {
    fn default() -> Self {
        NotificationKind::Alert
    }
}

impl NotificationKind {
    /// Kinds that represent an authorization change (permission grants,
    /// not informational feature toggles).
    pub fn is_permission_scoped(self) -> bool {
        matches!(
            self,
            NotificationKind::PermissionUpdate | NotificationKind::TenancyPermissionUpdate
        )
    }
}

/// A server-pushed notification record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    /// Open key-value bag; may carry a navigation `link`, related
    /// entity ids, numeric amounts.
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub is_read: bool,
    /// Epoch milliseconds, set at creation, immutable
    #[serde(default)]
    pub created_at: i64,
}

impl Notification {
    /// Navigation link carried in the payload, if any
    pub fn link(&self) -> Option<&str> {
        self.payload.get("link").and_then(Value::as_str)
    }
}

/// Authorization attributes returned by the profile endpoint.
///
/// All three fields are open-shaped JSON; the client merges them into
/// the session store without interpreting their contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionProfile {
    #[serde(default)]
    pub permissions: Value,
    #[serde(default)]
    pub features: Value,
    #[serde(default)]
    pub tenancy: Value,
}

impl SessionProfile {
    /// A profile with none of the three fields present is malformed
    /// for resync purposes.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_null() && self.features.is_null() && self.tenancy.is_null()
    }
}

/// Envelope for `GET /auth/profile`
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<SessionProfile>,
}

/// First page of notifications plus the authoritative unread count
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsPage {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub unread_count: u64,
}

/// Envelope for `GET /notifications`
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsResponse {
    pub data: NotificationsPage,
}
