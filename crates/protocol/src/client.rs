//! Client → Server events

use serde::{Deserialize, Serialize};

/// Events sent from client to server over the realtime channel.
///
/// All of these are fire-and-forget: the server answers (where it
/// answers at all) with one of the push events in [`crate::server`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Request the authoritative unread count
    GetUnreadCount,
    MarkNotificationRead {
        notification_id: String,
    },
    MarkMultipleAsRead {
        notification_ids: Vec<String>,
    },

    // Named broadcast channels (e.g. per-order tracking)
    JoinRoom {
        room: String,
    },
    LeaveRoom {
        room: String,
    },
}

#[cfg(test)]
mod tests {
    use super::ClientEvent;

    #[test]
    fn serializes_camel_case_tags_and_fields() {
        let json = serde_json::to_string(&ClientEvent::MarkNotificationRead {
            notification_id: "n1".to_string(),
        })
        .expect("serialize");
        assert_eq!(
            json,
            r#"{"type":"markNotificationRead","notificationId":"n1"}"#
        );

        let json = serde_json::to_string(&ClientEvent::GetUnreadCount).expect("serialize");
        assert_eq!(json, r#"{"type":"getUnreadCount"}"#);
    }

    #[test]
    fn roundtrip_mark_multiple() {
        let json = r#"{"type":"markMultipleAsRead","notificationIds":["a","b"]}"#;
        let parsed: ClientEvent = serde_json::from_str(json).expect("parse markMultipleAsRead");
        match &parsed {
            ClientEvent::MarkMultipleAsRead { notification_ids } => {
                assert_eq!(notification_ids, &["a", "b"]);
            }
            other => panic!("unexpected variant: {:?}", other),
        }

        let serialized = serde_json::to_string(&parsed).expect("serialize");
        let _: ClientEvent = serde_json::from_str(&serialized).expect("reparse");
    }

    #[test]
    fn roundtrip_join_leave_room() {
        let json = r#"{"type":"joinRoom","room":"order-42"}"#;
        let parsed: ClientEvent = serde_json::from_str(json).expect("parse joinRoom");
        match &parsed {
            ClientEvent::JoinRoom { room } => assert_eq!(room, "order-42"),
            other => panic!("unexpected variant: {:?}", other),
        }

        let json = r#"{"type":"leaveRoom","room":"order-42"}"#;
        let parsed: ClientEvent = serde_json::from_str(json).expect("parse leaveRoom");
        match parsed {
            ClientEvent::LeaveRoom { room } => assert_eq!(room, "order-42"),
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
