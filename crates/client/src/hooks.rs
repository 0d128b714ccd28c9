//! Collaborator interfaces injected into the manager.
//!
//! The hosting app wires real implementations (a toast bar, OS
//! notifications, a webview reload); all default to no-ops so the
//! manager works with no UI mounted. Sinks must never block and any
//! panic inside them must not reach the feed, so the manager calls
//! them last in every handler.

use std::time::Duration;

use washport_protocol::{Notification, Severity};

/// A transient, dismissible message the hosting UI may display
#[derive(Debug, Clone)]
pub struct BannerRequest {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub action: BannerAction,
}

/// Affordance attached to a banner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerAction {
    None,
    /// Offer an immediate full refresh (authorization changed)
    RefreshNow,
}

/// Optional toast/banner surface
pub trait BannerSink: Send + Sync {
    fn show(&self, request: BannerRequest);
}

/// Best-effort platform side effects on notification push.
///
/// Sound is a stubbed extension point: the default implementation of
/// `play_sound` does nothing and current callers rely on that.
pub trait AlertSink: Send + Sync {
    fn play_sound(&self, _severity: Severity) {}

    /// Desktop-level notification, shown only if permission was
    /// previously granted.
    fn desktop_notify(&self, _notification: &Notification) {}

    fn haptic_pulse(&self) {}

    /// Ask for desktop-notification permission if not already decided.
    fn request_permission(&self) {}
}

/// Receives the full-refresh fallback when silent resync fails.
///
/// `reload` fires after the configured delay has already elapsed; the
/// sink should refresh the whole surface (the store on disk is the
/// source of truth and is re-read on reload, so a late reload after a
/// successful resync is harmless).
pub trait ReloadSink: Send + Sync {
    fn reload(&self, scheduled_after: Duration);
}

/// Default banner sink: drops requests
pub struct NoopBanner;

impl BannerSink for NoopBanner {
    fn show(&self, _request: BannerRequest) {}
}

/// Default alert sink: all methods keep their no-op defaults
pub struct NoopAlerts;

impl AlertSink for NoopAlerts {}

/// Default reload sink: logs the missed reload so headless hosts can
/// spot stale-authorization windows.
pub struct NoopReload;

impl ReloadSink for NoopReload {
    fn reload(&self, scheduled_after: Duration) {
        tracing::warn!(
            component = "hooks",
            event = "reload.unhandled",
            scheduled_after_ms = scheduled_after.as_millis() as u64,
            "Full reload requested but no reload sink is installed"
        );
    }
}
