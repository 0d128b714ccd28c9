//! REST calls consumed by the manager.
//!
//! Cold-start and manual-recovery path only; steady-state data flows
//! over the push channel.

use washport_protocol::{NotificationsPage, NotificationsResponse};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// First page of notifications (most recent N) plus the authoritative
/// unread count.
pub(crate) async fn fetch_notifications_page(
    http: &reqwest::Client,
    config: &ClientConfig,
    token: &str,
) -> Result<NotificationsPage, ClientError> {
    let url = config.rest_url("notifications");
    let response = http
        .get(&url)
        .query(&[("limit", config.page_size)])
        .bearer_auth(token)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Status(status.as_u16()));
    }

    let body: NotificationsResponse = response.json().await?;
    Ok(body.data)
}
