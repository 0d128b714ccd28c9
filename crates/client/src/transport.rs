//! Connection supervisor.
//!
//! One task per `connect()` call: dial the realtime endpoint with the
//! bearer token, pump inbound frames into the dispatcher and outbound
//! events onto the wire, and retry with capped exponential backoff
//! when the transport drops. The supervisor exits when the manager
//! drops its outbound sender (explicit disconnect) or the retry
//! budget runs out.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use washport_protocol::{ClientEvent, ServerEvent};

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::feed::FeedState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

pub(crate) struct ConnectionParams {
    pub config: Arc<ClientConfig>,
    pub token: String,
    pub feed: Arc<FeedState>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Why a served connection ended
enum Served {
    /// Manager dropped the outbound sender; do not reconnect
    ManagerDropped,
    /// Transport-level close or error; reconnect per policy
    TransportClosed,
}

pub(crate) async fn run(params: ConnectionParams, mut outbound_rx: mpsc::Receiver<ClientEvent>) {
    let mut attempt: u32 = 0;
    loop {
        match open(&params).await {
            Ok(stream) => {
                attempt = 0;
                info!(
                    component = "transport",
                    event = "ws.connected",
                    url = %params.config.socket_url(),
                    "Realtime connection established"
                );
                params.feed.set_connected(true);
                let served = serve(stream, &params, &mut outbound_rx).await;
                params.feed.set_connected(false);
                info!(
                    component = "transport",
                    event = "ws.disconnected",
                    "Realtime connection closed"
                );
                if matches!(served, Served::ManagerDropped) {
                    return;
                }
            }
            Err(e) => {
                // Logged only; isConnected stays false
                warn!(
                    component = "transport",
                    event = "ws.connect_error",
                    error = %e,
                    attempt,
                    "Realtime connect failed"
                );
            }
        }

        attempt += 1;
        if attempt > params.config.reconnect_max_attempts {
            warn!(
                component = "transport",
                event = "ws.retries_exhausted",
                attempts = attempt - 1,
                "Giving up on reconnect; a later connect() starts fresh"
            );
            return;
        }

        let delay = backoff_delay(&params.config, attempt);
        debug!(
            component = "transport",
            event = "ws.reconnect_wait",
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Waiting before reconnect"
        );
        let wait = tokio::time::sleep(delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                event = outbound_rx.recv() => match event {
                    // Not connected: fire-and-forget events are dropped
                    Some(dropped) => debug!(
                        component = "transport",
                        event = "ws.outbound_dropped",
                        kind = ?dropped,
                        "Dropping outbound event while disconnected"
                    ),
                    None => return,
                },
            }
        }
    }
}

async fn open(params: &ConnectionParams) -> Result<WsStream, ClientError> {
    let url = format!("{}&token={}", params.config.socket_url(), params.token);
    let mut request = url.into_client_request()?;
    // Token also travels as a header; the backend accepts either
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", params.token)) {
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    let (stream, _response) = connect_async(request).await?;
    Ok(stream)
}

async fn serve(
    stream: WsStream,
    params: &ConnectionParams,
    outbound_rx: &mut mpsc::Receiver<ClientEvent>,
) -> Served {
    let (mut ws_tx, mut ws_rx) = stream.split();

    // Ask for the authoritative unread count straight away; local
    // optimism gets corrected by the answer.
    if send_event(&mut ws_tx, &ClientEvent::GetUnreadCount)
        .await
        .is_err()
    {
        return Served::TransportClosed;
    }

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                if !pump_inbound(inbound, params) {
                    return Served::TransportClosed;
                }
            }
            outbound = outbound_rx.recv() => match outbound {
                Some(event) => {
                    if send_event(&mut ws_tx, &event).await.is_err() {
                        return Served::TransportClosed;
                    }
                }
                None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Served::ManagerDropped;
                }
            }
        }
    }
}

/// Returns false when the connection is done (orderly close or error)
fn pump_inbound(
    inbound: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    params: &ConnectionParams,
) -> bool {
    match inbound {
        Some(Ok(Message::Text(text))) => {
            match serde_json::from_str::<ServerEvent>(&text) {
                Ok(event) => params.dispatcher.handle(event),
                Err(e) => warn!(
                    component = "transport",
                    event = "ws.message.parse_failed",
                    error = %e,
                    payload_bytes = text.len(),
                    payload_preview = %truncate_for_log(&text, 240),
                    "Failed to parse server event"
                ),
            }
            true
        }
        // Pings are answered by the websocket layer itself
        Some(Ok(Message::Close(_))) => false,
        Some(Ok(_)) => true,
        Some(Err(e)) => {
            warn!(
                component = "transport",
                event = "ws.connection.error",
                error = %e,
                "Realtime connection error"
            );
            false
        }
        None => false,
    }
}

async fn send_event(ws_tx: &mut WsSink, event: &ClientEvent) -> Result<(), ClientError> {
    let json = serde_json::to_string(event)?;
    ws_tx.send(Message::Text(json.into())).await?;
    Ok(())
}

fn truncate_for_log(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn backoff_delay(config: &ClientConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = config
        .reconnect_base_delay
        .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
    delay.min(config.reconnect_max_delay)
}
