//! In-memory notification feed.
//!
//! One mutable working copy guarded by a lock, published as immutable
//! snapshots through `ArcSwap` so readers never block, with a
//! broadcast change feed for reactive consumers. Mutations are short
//! and synchronous; nothing awaits while holding the lock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use washport_protocol::{now_ms, Notification, NotificationKind};

/// Immutable view of the feed, cheap to clone via `Arc`
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    /// Most recent first
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    pub is_connected: bool,
    /// True only during a refetch's in-flight window
    pub loading: bool,
}

/// Which authorization-change family a broadcast came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeFamily {
    Permissions,
    TenancyFeatures,
    TenancyPermissions,
}

impl AuthChangeFamily {
    pub fn kind(self) -> NotificationKind {
        match self {
            AuthChangeFamily::Permissions => NotificationKind::PermissionUpdate,
            AuthChangeFamily::TenancyFeatures => NotificationKind::TenancyFeatureUpdate,
            AuthChangeFamily::TenancyPermissions => NotificationKind::TenancyPermissionUpdate,
        }
    }
}

/// Change signals emitted after each state mutation.
///
/// Independent consumers (badges, permission-driven menus, reload
/// prompts) subscribe here instead of reaching into the manager.
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    Connected,
    Disconnected,
    NotificationPushed { id: String },
    UnreadCount { count: u64 },
    MarkedRead { ids: Vec<String> },
    Replaced,
    /// Raw server payload of an authorization-change broadcast
    AuthorizationChanged {
        family: AuthChangeFamily,
        payload: Value,
    },
    /// The session store was merge-patched after a silent resync
    StorePatched,
    /// Silent resync failed; a full reload fired (or would have)
    ReloadRequired,
}

/// Shared feed state handle
pub struct FeedState {
    inner: Mutex<FeedCore>,
    snapshot: ArcSwap<FeedSnapshot>,
    updates: broadcast::Sender<FeedUpdate>,
}

#[derive(Default)]
struct FeedCore {
    notifications: Vec<Notification>,
    unread_count: u64,
    is_connected: bool,
    loading: bool,
}

impl FeedCore {
    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            notifications: self.notifications.clone(),
            unread_count: self.unread_count,
            is_connected: self.is_connected,
            loading: self.loading,
        }
    }
}

impl Default for FeedState {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(FeedCore::default()),
            snapshot: ArcSwap::from_pointee(FeedSnapshot::default()),
            updates,
        }
    }
}

impl FeedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Lock-free snapshot read
    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.updates.subscribe()
    }

    pub(crate) fn emit(&self, update: FeedUpdate) {
        let _ = self.updates.send(update);
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut FeedCore) -> R) -> R {
        let mut core = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let result = f(&mut core);
        self.snapshot.store(Arc::new(core.snapshot()));
        result
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        let changed = self.mutate(|core| {
            let changed = core.is_connected != connected;
            core.is_connected = connected;
            changed
        });
        if changed {
            self.emit(if connected {
                FeedUpdate::Connected
            } else {
                FeedUpdate::Disconnected
            });
        }
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.mutate(|core| core.loading = loading);
    }

    /// Prepend a pushed notification; unread pushes bump the counter.
    pub(crate) fn push(&self, notification: Notification) {
        let id = notification.id.clone();
        self.mutate(|core| {
            if !notification.is_read {
                core.unread_count += 1;
            }
            core.notifications.insert(0, notification);
        });
        self.emit(FeedUpdate::NotificationPushed { id });
    }

    /// Authoritative overwrite from the server, not an increment
    pub(crate) fn correct_unread(&self, count: u64) {
        self.mutate(|core| core.unread_count = count);
        self.emit(FeedUpdate::UnreadCount { count });
    }

    /// Flag the listed ids read. Only ids found unread decrement the
    /// counter, so a repeated mark-read push cannot drive it below
    /// the true value (or below zero).
    pub(crate) fn mark_read(&self, ids: &[String]) {
        let newly_read = self.mutate(|core| {
            let mut newly_read = 0u64;
            for notification in core.notifications.iter_mut() {
                if !notification.is_read && ids.iter().any(|id| *id == notification.id) {
                    notification.is_read = true;
                    newly_read += 1;
                }
            }
            core.unread_count = core.unread_count.saturating_sub(newly_read);
            newly_read
        });
        if newly_read > 0 {
            self.emit(FeedUpdate::MarkedRead { ids: ids.to_vec() });
        }
    }

    /// Replace the feed wholesale (refetch result)
    pub(crate) fn replace(&self, notifications: Vec<Notification>, unread_count: u64) {
        self.mutate(|core| {
            core.notifications = notifications;
            core.unread_count = unread_count;
        });
        self.emit(FeedUpdate::Replaced);
    }

    /// True when a notification of `kind` was created within the
    /// suppression window. Linear scan over the feed; the list is
    /// capped by the fetch page size, so this stays cheap.
    pub(crate) fn has_recent(&self, kind: NotificationKind, window: Duration) -> bool {
        let cutoff = now_ms() - window.as_millis() as i64;
        let core = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let recent = core
            .notifications
            .iter()
            .any(|n| n.kind == kind && n.created_at >= cutoff);
        if recent {
            debug!(
                component = "feed",
                event = "feed.duplicate_suppressed",
                kind = ?kind,
                "Duplicate broadcast within suppression window, skipping"
            );
        }
        recent
    }
}
