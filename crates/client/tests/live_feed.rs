//! End-to-end tests against an in-process mock backend: one axum
//! server exposing the realtime `/ws` route plus the two REST
//! endpoints the client consumes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use washport_client::{ClientConfig, FeedUpdate, SessionStore, SocketManager};
use washport_protocol::{Notification, NotificationKind, ServerEvent, Severity};

const TOKEN: &str = "tok";

struct MockState {
    connections: AtomicUsize,
    inbound: Mutex<Vec<Value>>,
    push_tx: broadcast::Sender<ServerEvent>,
    page_body: Mutex<Value>,
    page_status: Mutex<u16>,
    profile_body: Mutex<Value>,
    profile_status: Mutex<u16>,
    profile_delay: Mutex<Duration>,
    profile_hits: AtomicUsize,
}

impl MockState {
    fn new() -> Arc<Self> {
        let (push_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            connections: AtomicUsize::new(0),
            inbound: Mutex::new(Vec::new()),
            push_tx,
            page_body: Mutex::new(json!({
                "data": {"notifications": [], "unreadCount": 0}
            })),
            page_status: Mutex::new(200),
            profile_body: Mutex::new(json!({
                "success": true,
                "data": {
                    "permissions": {"p": 2},
                    "features": {"f": 1},
                    "tenancy": {"id": "y"}
                }
            })),
            profile_status: Mutex::new(200),
            profile_delay: Mutex::new(Duration::ZERO),
            profile_hits: AtomicUsize::new(0),
        })
    }

    fn push(&self, event: ServerEvent) {
        self.push_tx.send(event).expect("no live socket to push to");
    }

    fn inbound_of_type(&self, kind: &str) -> usize {
        self.inbound
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.get("type").and_then(Value::as_str) == Some(kind))
            .count()
    }
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        == Some(TOKEN)
}

async fn ws_handler(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.get("token").map(String::as_str) != Some(TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.connections.fetch_add(1, Ordering::SeqCst);
    // Subscribe before the upgrade completes so a push racing the
    // client's "connected" observation is never lost.
    let push_rx = state.push_tx.subscribe();
    ws.on_upgrade(move |socket| serve_socket(socket, state, push_rx))
}

async fn serve_socket(
    socket: WebSocket,
    state: Arc<MockState>,
    mut push_rx: broadcast::Receiver<ServerEvent>,
) {
    let (mut tx, mut rx) = socket.split();
    loop {
        tokio::select! {
            inbound = rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                        state.inbound.lock().unwrap().push(value);
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            push = push_rx.recv() => match push {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap();
                    if tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }
}

async fn notifications_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let status = *state.page_status.lock().unwrap();
    if status != 200 {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    Json(state.page_body.lock().unwrap().clone()).into_response()
}

async fn profile_handler(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.profile_hits.fetch_add(1, Ordering::SeqCst);
    let delay = *state.profile_delay.lock().unwrap();
    if delay > Duration::ZERO {
        tokio::time::sleep(delay).await;
    }
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let status = *state.profile_status.lock().unwrap();
    if status != 200 {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    Json(state.profile_body.lock().unwrap().clone()).into_response()
}

async fn spawn_backend(state: Arc<MockState>) -> SocketAddr {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/notifications", get(notifications_handler))
        .route("/api/auth/profile", get(profile_handler))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct Harness {
    backend: Arc<MockState>,
    manager: SocketManager,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    harness_with(|_| {}).await
}

async fn harness_with(tweak: impl FnOnce(&mut ClientConfig)) -> Harness {
    let backend = MockState::new();
    let addr = spawn_backend(Arc::clone(&backend)).await;

    let dir = tempfile::tempdir().unwrap();
    let session = dir.path().join("session.json");
    std::fs::write(
        &session,
        serde_json::to_vec(&json!({
            "state": {
                "token": TOKEN,
                "user": {
                    "id": "u1",
                    "permissions": {"p": 1},
                    "features": {"f": 1},
                    "tenancy": {"id": "x"},
                    "other": "keep-me"
                }
            }
        }))
        .unwrap(),
    )
    .unwrap();

    let mut config = ClientConfig::new(format!("http://{addr}/api"), &session);
    config.resync_fallback_delay = Duration::from_millis(150);
    tweak(&mut config);

    let store = Arc::new(SessionStore::open(&session));
    let manager = SocketManager::new(config, store);
    Harness {
        backend,
        manager,
        _dir: dir,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

fn notification(id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        kind: NotificationKind::Alert,
        title: "Order ready".to_string(),
        message: "Order #42 is ready".to_string(),
        severity: Severity::Warning,
        payload: Default::default(),
        is_read: false,
        created_at: washport_protocol::now_ms(),
    }
}

#[tokio::test]
async fn connect_is_idempotent() {
    let h = harness().await;

    h.manager.connect();
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;
    h.manager.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.backend.connections.load(Ordering::SeqCst), 1);
    // One connection's worth of unread-count requests, no duplicates
    assert_eq!(h.backend.inbound_of_type("getUnreadCount"), 1);
}

#[tokio::test]
async fn unread_count_correction_is_authoritative() {
    let h = harness().await;
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    h.backend.push(ServerEvent::UnreadCount { count: 3 });
    wait_until(|| h.manager.snapshot().unread_count == 3).await;
}

#[tokio::test]
async fn notification_push_lands_at_feed_head() {
    let h = harness().await;
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    h.backend.push(ServerEvent::UnreadCount { count: 2 });
    wait_until(|| h.manager.snapshot().unread_count == 2).await;

    h.backend.push(ServerEvent::Notification {
        notification: notification("n1"),
    });
    wait_until(|| {
        let snap = h.manager.snapshot();
        snap.notifications.first().map(|n| n.id.as_str()) == Some("n1") && snap.unread_count == 3
    })
    .await;
}

#[tokio::test]
async fn marked_read_push_flips_flag_and_decrements() {
    let h = harness().await;
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    h.backend.push(ServerEvent::Notification {
        notification: notification("n1"),
    });
    wait_until(|| h.manager.snapshot().unread_count == 1).await;

    h.backend.push(ServerEvent::NotificationMarkedRead {
        notification_id: "n1".to_string(),
    });
    wait_until(|| {
        let snap = h.manager.snapshot();
        snap.unread_count == 0 && snap.notifications[0].is_read
    })
    .await;

    // A duplicate push for the same id must not underflow
    h.backend.push(ServerEvent::NotificationMarkedRead {
        notification_id: "n1".to_string(),
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.manager.snapshot().unread_count, 0);
}

#[tokio::test]
async fn mark_as_read_reaches_the_server() {
    let h = harness().await;
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    h.manager.mark_as_read("n1");
    h.manager
        .mark_multiple_as_read(vec!["a".to_string(), "b".to_string()]);
    h.manager.join_room("order-42");

    wait_until(|| {
        h.backend.inbound_of_type("markNotificationRead") == 1
            && h.backend.inbound_of_type("markMultipleAsRead") == 1
            && h.backend.inbound_of_type("joinRoom") == 1
    })
    .await;
}

#[tokio::test]
async fn permission_update_synthesizes_and_resyncs() {
    let h = harness().await;
    let mut updates = h.manager.subscribe();
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    h.backend.push(ServerEvent::PermissionsUpdated {
        message: Some("Role changed".to_string()),
        payload: Default::default(),
    });

    // Exactly one synthesized notification of the permission kind
    wait_until(|| {
        let snap = h.manager.snapshot();
        snap.notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::PermissionUpdate)
            .count()
            == 1
            && snap.unread_count == 1
    })
    .await;

    // The silent resync patched the store without touching the rest
    wait_until(|| {
        let blob = h.manager.store().value();
        blob.pointer("/state/user/permissions/p") == Some(&json!(2))
    })
    .await;
    let blob = h.manager.store().value();
    assert_eq!(blob.pointer("/state/token"), Some(&json!(TOKEN)));
    assert_eq!(blob.pointer("/state/user/other"), Some(&json!("keep-me")));
    assert_eq!(blob.pointer("/state/user/tenancy/id"), Some(&json!("y")));
    assert!(h.backend.profile_hits.load(Ordering::SeqCst) >= 1);

    // Reactive consumers saw both the broadcast and the store patch
    let mut saw_auth_change = false;
    let mut saw_store_patch = false;
    while let Ok(update) = updates.try_recv() {
        match update {
            FeedUpdate::AuthorizationChanged { .. } => saw_auth_change = true,
            FeedUpdate::StorePatched => saw_store_patch = true,
            _ => {}
        }
    }
    assert!(saw_auth_change);
    assert!(saw_store_patch);
}

#[tokio::test]
async fn concurrent_auth_events_share_one_resync() {
    let h = harness().await;
    *h.backend.profile_delay.lock().unwrap() = Duration::from_millis(300);
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    // Different families, so duplicate suppression does not apply;
    // only the in-flight guard can keep this at one call.
    h.backend.push(ServerEvent::PermissionsUpdated {
        message: None,
        payload: Default::default(),
    });
    h.backend.push(ServerEvent::TenancyFeaturesUpdated {
        message: None,
        payload: Default::default(),
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.backend.profile_hits.load(Ordering::SeqCst), 1);

    // Still one call after the first resync finishes
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.backend.profile_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_resync_schedules_delayed_reload() {
    let h = harness().await;
    *h.backend.profile_status.lock().unwrap() = 500;
    let mut updates = h.manager.subscribe();
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    let pushed_at = Instant::now();
    h.backend.push(ServerEvent::PermissionsUpdated {
        message: None,
        payload: Default::default(),
    });

    loop {
        let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("reload never fired")
            .expect("update channel closed");
        if matches!(update, FeedUpdate::ReloadRequired) {
            break;
        }
    }
    // Not earlier than the configured fallback delay
    assert!(pushed_at.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn successful_resync_cancels_pending_reload() {
    let h = harness().await;
    *h.backend.profile_status.lock().unwrap() = 500;
    let mut updates = h.manager.subscribe();
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    h.backend.push(ServerEvent::PermissionsUpdated {
        message: None,
        payload: Default::default(),
    });
    wait_until(|| h.backend.profile_hits.load(Ordering::SeqCst) >= 1).await;
    // Give the failing resync time to finish and schedule the reload
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Endpoint recovers; the next family's resync succeeds and must
    // cancel the reload the first failure scheduled.
    *h.backend.profile_status.lock().unwrap() = 200;
    h.backend.push(ServerEvent::TenancyFeaturesUpdated {
        message: None,
        payload: Default::default(),
    });
    wait_until(|| {
        h.manager.store().value().pointer("/state/user/permissions/p") == Some(&json!(2))
    })
    .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    let mut saw_reload = false;
    while let Ok(update) = updates.try_recv() {
        if matches!(update, FeedUpdate::ReloadRequired) {
            saw_reload = true;
        }
    }
    assert!(!saw_reload, "reload fired despite successful resync");
}

#[tokio::test]
async fn start_pulls_first_page_over_rest() {
    let h = harness().await;
    *h.backend.page_body.lock().unwrap() = json!({
        "data": {
            "notifications": [
                {"id": "n2", "isRead": false, "createdAt": 2},
                {"id": "n1", "isRead": true, "createdAt": 1}
            ],
            "unreadCount": 5
        }
    });

    h.manager.start().await;

    let snap = h.manager.snapshot();
    assert_eq!(snap.notifications.len(), 2);
    assert_eq!(snap.notifications[0].id, "n2");
    assert_eq!(snap.unread_count, 5);
    assert!(!snap.loading);
    wait_until(|| h.manager.is_connected()).await;
}

#[tokio::test]
async fn refetch_swallows_unauthorized() {
    let h = harness().await;
    *h.backend.page_status.lock().unwrap() = 401;

    // Must not panic or surface anything
    h.manager.refetch().await;

    let snap = h.manager.snapshot();
    assert!(snap.notifications.is_empty());
    assert!(!snap.loading);
}

#[tokio::test]
async fn disconnect_tears_down_and_stays_down() {
    let h = harness().await;
    h.manager.connect();
    wait_until(|| h.manager.is_connected()).await;

    h.manager.disconnect();
    wait_until(|| !h.manager.is_connected()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.backend.connections.load(Ordering::SeqCst), 1);
}
