//! Session socket manager.
//!
//! One instance per authenticated session lifetime, owned by the
//! session boot/teardown code. `connect`/`disconnect` are the only
//! way to change lifecycle state; consumers never touch the socket
//! directly. No public method returns an error or panics; failures
//! degrade to "stay disconnected" or a scheduled fallback.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use washport_protocol::ClientEvent;

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::feed::{FeedSnapshot, FeedState, FeedUpdate};
use crate::hooks::{AlertSink, BannerSink, NoopAlerts, NoopBanner, NoopReload, ReloadSink};
use crate::resync::Resync;
use crate::rest;
use crate::store::SessionStore;
use crate::transport::{self, ConnectionParams};

const OUTBOUND_BUFFER: usize = 64;

/// UI collaborators injected into the manager; all default to no-ops
/// so the manager runs headless.
pub struct Sinks {
    pub banner: Arc<dyn BannerSink>,
    pub alerts: Arc<dyn AlertSink>,
    pub reload: Arc<dyn ReloadSink>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            banner: Arc::new(NoopBanner),
            alerts: Arc::new(NoopAlerts),
            reload: Arc::new(NoopReload),
        }
    }
}

struct ConnectionHandle {
    outbound_tx: mpsc::Sender<ClientEvent>,
    task: JoinHandle<()>,
}

pub struct SocketManager {
    config: Arc<ClientConfig>,
    store: Arc<SessionStore>,
    feed: Arc<FeedState>,
    http: reqwest::Client,
    alerts: Arc<dyn AlertSink>,
    dispatcher: Arc<Dispatcher>,
    connection: Mutex<Option<ConnectionHandle>>,
}

impl SocketManager {
    pub fn new(config: ClientConfig, store: Arc<SessionStore>) -> Self {
        Self::with_sinks(config, store, Sinks::default())
    }

    pub fn with_sinks(config: ClientConfig, store: Arc<SessionStore>, sinks: Sinks) -> Self {
        let config = Arc::new(config);
        let feed = FeedState::new();
        let http = reqwest::Client::new();
        let resync = Resync::new(
            Arc::clone(&config),
            Arc::clone(&store),
            http.clone(),
            Arc::clone(&feed),
            sinks.reload,
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&config),
            Arc::clone(&feed),
            resync,
            sinks.banner,
            Arc::clone(&sinks.alerts),
        ));
        Self {
            config,
            store,
            feed,
            http,
            alerts: sinks.alerts,
            dispatcher,
            connection: Mutex::new(None),
        }
    }

    /// Mount-time convenience: request notification permission,
    /// connect, and pull the first page. Idle when no token exists —
    /// the host re-invokes once a token appears.
    pub async fn start(&self) {
        if self.store.token().is_none() {
            debug!(
                component = "manager",
                event = "manager.idle",
                "No credential present, staying idle"
            );
            return;
        }
        self.alerts.request_permission();
        self.connect();
        self.refetch().await;
    }

    /// Idempotent: a no-op without a token, and a no-op while a
    /// connection task is already running.
    pub fn connect(&self) {
        let Some(token) = self.store.token() else {
            debug!(
                component = "manager",
                event = "manager.connect_skipped",
                "No credential present, not connecting"
            );
            return;
        };

        let mut slot = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.as_ref() {
            if !handle.task.is_finished() {
                debug!(
                    component = "manager",
                    event = "manager.already_connected",
                    "connect() while connection task is live, ignoring"
                );
                return;
            }
        }

        info!(
            component = "manager",
            event = "manager.connecting",
            url = %self.config.socket_url(),
            "Opening realtime connection"
        );
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let task = tokio::spawn(transport::run(
            ConnectionParams {
                config: Arc::clone(&self.config),
                token,
                feed: Arc::clone(&self.feed),
                dispatcher: Arc::clone(&self.dispatcher),
            },
            outbound_rx,
        ));
        *slot = Some(ConnectionHandle { outbound_tx, task });
    }

    /// Idempotent teardown; safe to call when not connected.
    pub fn disconnect(&self) {
        let handle = {
            let mut slot = self.connection.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(handle) = handle {
            // Dropping the sender lets the supervisor close cleanly;
            // aborting covers a supervisor stuck mid-handshake.
            drop(handle.outbound_tx);
            handle.task.abort();
            self.feed.set_connected(false);
            info!(
                component = "manager",
                event = "manager.disconnected",
                "Realtime connection torn down"
            );
        }
    }

    /// Fire-and-forget; silently dropped when not connected (the UI
    /// re-issues via `refetch` after a reconnect).
    pub fn mark_as_read(&self, notification_id: impl Into<String>) {
        self.send_event(ClientEvent::MarkNotificationRead {
            notification_id: notification_id.into(),
        });
    }

    pub fn mark_multiple_as_read(&self, notification_ids: Vec<String>) {
        self.send_event(ClientEvent::MarkMultipleAsRead { notification_ids });
    }

    pub fn join_room(&self, room: impl Into<String>) {
        self.send_event(ClientEvent::JoinRoom { room: room.into() });
    }

    pub fn leave_room(&self, room: impl Into<String>) {
        self.send_event(ClientEvent::LeaveRoom { room: room.into() });
    }

    /// Best-effort background refresh of the first page plus the
    /// authoritative unread count. Never surfaces an error: 401 means
    /// the session-expiry guard elsewhere is about to take over, and
    /// anything else only warrants a log line.
    pub async fn refetch(&self) {
        let Some(token) = self.store.token() else {
            debug!(
                component = "manager",
                event = "refetch.skipped",
                "No credential present, not fetching"
            );
            return;
        };

        self.feed.set_loading(true);
        match rest::fetch_notifications_page(&self.http, &self.config, &token).await {
            Ok(page) => {
                debug!(
                    component = "manager",
                    event = "refetch.completed",
                    count = page.notifications.len(),
                    unread = page.unread_count,
                    "Notification page refreshed"
                );
                self.feed.replace(page.notifications, page.unread_count);
            }
            Err(e) if e.is_unauthorized() => {
                debug!(
                    component = "manager",
                    event = "refetch.unauthorized",
                    "Refetch got 401, leaving session-expiry handling to the host"
                );
            }
            Err(e) => {
                warn!(
                    component = "manager",
                    event = "refetch.failed",
                    error = %e,
                    "Refetch failed, keeping current feed"
                );
            }
        }
        self.feed.set_loading(false);
    }

    /// Lock-free snapshot of the reactive state
    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.feed.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.feed.snapshot().is_connected
    }

    /// Change feed for reactive consumers (sidebar permissions,
    /// unread badges, reload prompts)
    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.feed.subscribe()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn send_event(&self, event: ClientEvent) {
        if !self.is_connected() {
            debug!(
                component = "manager",
                event = "manager.event_dropped",
                kind = ?event,
                "Not connected, dropping fire-and-forget event"
            );
            return;
        }
        let slot = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.as_ref() {
            if handle.outbound_tx.try_send(event).is_err() {
                debug!(
                    component = "manager",
                    event = "manager.outbound_full",
                    "Outbound channel full or closed, event dropped"
                );
            }
        }
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        let mut slot = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.task.abort();
        }
    }
}
