//! Realtime push channel.
//!
//! Every authenticated socket registers with the [`Hub`] under its user id.
//! Handlers push [`ServerEvent`]s to users after their database writes have
//! committed; delivery is best effort and clients re-sync over REST.

pub mod hub;
pub mod socket;

use serde::Serialize;

use crate::db::models::Message;

pub use hub::{ConnectionId, Hub};

/// Events pushed to clients, serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Sorted ids of every user with at least one live socket.
    GetOnlineUsers(Vec<String>),
    NewMessage(Message),
    /// The recipient's authoritative total of unread messages.
    UnreadCount { count: i64 },
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        conversation_id: String,
        reader_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_type_and_data_envelope() {
        let presence = serde_json::to_value(ServerEvent::GetOnlineUsers(vec!["u1".into()])).unwrap();
        assert_eq!(presence["type"], "getOnlineUsers");
        assert_eq!(presence["data"][0], "u1");

        let unread = serde_json::to_value(ServerEvent::UnreadCount { count: 3 }).unwrap();
        assert_eq!(unread["type"], "unreadCount");
        assert_eq!(unread["data"]["count"], 3);

        let read = serde_json::to_value(ServerEvent::MessagesRead {
            conversation_id: "c1".into(),
            reader_id: "u2".into(),
        })
        .unwrap();
        assert_eq!(read["type"], "messagesRead");
        assert_eq!(read["data"]["conversationId"], "c1");
        assert_eq!(read["data"]["readerId"], "u2");
    }
}
