//! Inbound event dispatch.
//!
//! One exhaustive match over [`ServerEvent`]. The three
//! authorization-change families funnel into a single parameterized
//! routine; everything else is a direct feed mutation plus best-effort
//! side effects. Handlers are synchronous and short; the resync is
//! fired into a task and the handler returns at once, so the read
//! loop is never blocked.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use washport_protocol::{new_id, now_ms, Notification, ServerEvent, Severity};

use crate::config::ClientConfig;
use crate::feed::{AuthChangeFamily, FeedState, FeedUpdate};
use crate::hooks::{AlertSink, BannerAction, BannerRequest, BannerSink};
use crate::resync::Resync;

pub(crate) struct Dispatcher {
    config: Arc<ClientConfig>,
    feed: Arc<FeedState>,
    resync: Arc<Resync>,
    banner: Arc<dyn BannerSink>,
    alerts: Arc<dyn AlertSink>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ClientConfig>,
        feed: Arc<FeedState>,
        resync: Arc<Resync>,
        banner: Arc<dyn BannerSink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            feed,
            resync,
            banner,
            alerts,
        }
    }

    pub fn handle(&self, event: ServerEvent) {
        match event {
            ServerEvent::Connected => {
                debug!(
                    component = "dispatch",
                    event = "ws.handshake_acked",
                    "Server acknowledged handshake"
                );
            }
            ServerEvent::Notification { notification } => self.handle_notification(notification),
            ServerEvent::UnreadCount { count } => self.feed.correct_unread(count),
            ServerEvent::NotificationMarkedRead { notification_id } => {
                self.feed.mark_read(std::slice::from_ref(&notification_id));
            }
            ServerEvent::NotificationsMarkedRead { notification_ids } => {
                self.feed.mark_read(&notification_ids);
            }
            ServerEvent::PermissionsUpdated { message, payload } => {
                self.handle_authorization_change(AuthChangeFamily::Permissions, message, payload);
            }
            ServerEvent::TenancyFeaturesUpdated { message, payload } => {
                self.handle_authorization_change(
                    AuthChangeFamily::TenancyFeatures,
                    message,
                    payload,
                );
            }
            ServerEvent::TenancyPermissionsUpdated { message, payload } => {
                self.handle_authorization_change(
                    AuthChangeFamily::TenancyPermissions,
                    message,
                    payload,
                );
            }
            ServerEvent::Error { code, message } => {
                warn!(
                    component = "dispatch",
                    event = "ws.server_error",
                    code = code.as_deref().unwrap_or("unknown"),
                    message = message.as_deref().unwrap_or(""),
                    "Server reported an error"
                );
            }
        }
    }

    fn handle_notification(&self, notification: Notification) {
        self.feed.push(notification.clone());

        // Side effects are best-effort and come after the state update
        self.alerts.play_sound(notification.severity);
        self.alerts.desktop_notify(&notification);
        self.alerts.haptic_pulse();
        self.banner.show(BannerRequest {
            title: notification.title.clone(),
            message: notification.message.clone(),
            severity: notification.severity,
            action: BannerAction::None,
        });
    }

    /// Shared routine for the three authorization-change families:
    /// synthesize a local notification, surface a banner, broadcast
    /// the raw payload, and kick a silent resync.
    fn handle_authorization_change(
        &self,
        family: AuthChangeFamily,
        message: Option<String>,
        payload: Map<String, Value>,
    ) {
        let kind = family.kind();

        // Redundant admin-console pushes arrive in bursts; one banner
        // per window is enough.
        if kind.is_permission_scoped() && self.feed.has_recent(kind, self.config.duplicate_window)
        {
            return;
        }

        let (title, fallback, severity, action) = match family {
            AuthChangeFamily::Permissions => (
                "Permissions updated",
                "Your permissions have changed.",
                Severity::Warning,
                BannerAction::RefreshNow,
            ),
            AuthChangeFamily::TenancyFeatures => (
                "Features updated",
                "Available features for your tenancy have changed.",
                Severity::Info,
                BannerAction::None,
            ),
            AuthChangeFamily::TenancyPermissions => (
                "Tenancy permissions updated",
                "Tenancy-wide permissions have changed.",
                Severity::Warning,
                BannerAction::RefreshNow,
            ),
        };
        let message = message.unwrap_or_else(|| fallback.to_string());

        let notification = Notification {
            id: new_id(),
            kind,
            title: title.to_string(),
            message: message.clone(),
            severity,
            payload: payload.clone(),
            is_read: false,
            created_at: now_ms(),
        };
        self.feed.push(notification.clone());

        self.banner.show(BannerRequest {
            title: title.to_string(),
            message,
            severity,
            action,
        });
        self.alerts.desktop_notify(&notification);

        // Raw server payload, for consumers that react to grant
        // changes without depending on the manager.
        let mut raw = payload;
        raw.entry("message".to_string())
            .or_insert_with(|| Value::String(notification.message.clone()));
        self.feed.emit(FeedUpdate::AuthorizationChanged {
            family,
            payload: Value::Object(raw),
        });

        self.resync.trigger();
    }
}
