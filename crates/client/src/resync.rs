//! Silent authorization resync.
//!
//! Shared by all three authorization-change event families: fetch the
//! profile endpoint, merge-patch the session store, and fall back to
//! a delayed full reload when the silent path is not possible. Only
//! one resync may be in flight at a time (process-wide flag, with a
//! timed safety net against the flag sticking).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use washport_protocol::ProfileResponse;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::feed::{FeedState, FeedUpdate};
use crate::hooks::ReloadSink;
use crate::store::SessionStore;

pub(crate) struct Resync {
    config: Arc<ClientConfig>,
    store: Arc<SessionStore>,
    http: reqwest::Client,
    feed: Arc<FeedState>,
    reload: Arc<dyn ReloadSink>,
    in_flight: AtomicBool,
    pending_reload: Mutex<Option<JoinHandle<()>>>,
}

impl Resync {
    pub fn new(
        config: Arc<ClientConfig>,
        store: Arc<SessionStore>,
        http: reqwest::Client,
        feed: Arc<FeedState>,
        reload: Arc<dyn ReloadSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            http,
            feed,
            reload,
            in_flight: AtomicBool::new(false),
            pending_reload: Mutex::new(None),
        })
    }

    /// Fire-and-forget. Skipped entirely when a resync is already in
    /// flight; the handler that called us returns immediately either
    /// way.
    pub fn trigger(self: &Arc<Self>) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!(
                component = "resync",
                event = "resync.already_in_flight",
                "Resync already running, skipping"
            );
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run().await;
        });
    }

    async fn run(self: Arc<Self>) {
        // Safety net: clear the flag after a fixed timeout in case an
        // unhandled path below never reaches the normal clear.
        let guard = {
            let this = Arc::clone(&self);
            let timeout = self.config.resync_guard_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if this.in_flight.swap(false, Ordering::SeqCst) {
                    warn!(
                        component = "resync",
                        event = "resync.guard_expired",
                        timeout_ms = timeout.as_millis() as u64,
                        "In-flight flag cleared by safety timer"
                    );
                }
            })
        };

        match self.fetch_and_patch().await {
            Ok(()) => {
                info!(
                    component = "resync",
                    event = "resync.patched",
                    "Authorization state silently refreshed"
                );
                self.cancel_pending_reload();
                self.feed.emit(FeedUpdate::StorePatched);
            }
            Err(e) => {
                warn!(
                    component = "resync",
                    event = "resync.failed",
                    error = %e,
                    "Silent resync failed, scheduling full reload"
                );
                self.schedule_reload();
            }
        }

        guard.abort();
        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn fetch_and_patch(&self) -> Result<(), ClientError> {
        let token = self.store.token().ok_or(ClientError::NoCredential)?;
        let url = self.config.rest_url("auth/profile");

        let response = self.http.get(&url).bearer_auth(&token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let body: ProfileResponse = response.json().await?;
        let profile = match body.data {
            Some(profile) if body.success && !profile.is_empty() => profile,
            _ => return Err(ClientError::ProfileRejected),
        };

        self.store.merge_authorization(&profile)
    }

    /// Schedule the full-reload fallback. A newer failure replaces an
    /// older pending timer rather than stacking reloads.
    fn schedule_reload(&self) {
        let mut pending = self.pending_reload.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stale) = pending.take() {
            stale.abort();
        }

        let delay = self.config.resync_fallback_delay;
        let feed = Arc::clone(&self.feed);
        let reload = Arc::clone(&self.reload);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            warn!(
                component = "resync",
                event = "resync.reload",
                delay_ms = delay.as_millis() as u64,
                "Falling back to full reload"
            );
            feed.emit(FeedUpdate::ReloadRequired);
            reload.reload(delay);
        }));
    }

    /// A successful resync makes the pending reload pointless; cancel
    /// it to avoid the visible flash. A reload that slips through
    /// anyway is harmless (it re-reads the corrected store).
    fn cancel_pending_reload(&self) {
        let mut pending = self.pending_reload.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
            debug!(
                component = "resync",
                event = "resync.reload_cancelled",
                "Pending reload cancelled after successful resync"
            );
        }
    }
}
