use std::collections::HashMap;

/// Canonical key for a 1:1 thread: the unordered `(sender, recipient)` pair,
/// rendered `"<lo>:<hi>"` so both directions of a conversation map to the
/// same key.
pub fn conversation_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub user_id: String,
    pub conversations: Vec<ConversationSummary>,
    pub current_conversation: Option<ConversationViewState>,
    pub total_unread: u32,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty(user_id: String) -> Self {
        Self {
            rev: 0,
            user_id,
            conversations: vec![],
            current_conversation: None,
            total_unread: 0,
            toast: None,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ConversationSummary {
    pub other_user_id: String,
    pub other_user_name: String,
    pub other_user_avatar: Option<String>,
    pub last_message: Option<String>,
    pub last_sender_id: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: u32,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ConversationViewState {
    pub other_user_id: String,
    pub other_user_name: String,
    pub messages: Vec<ChatMessage>,
    pub history_loaded: bool,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    /// Epoch milliseconds. Wire timestamps are ISO-8601 and converted at the
    /// API boundary.
    pub created_at: i64,
    pub read_at: Option<i64>,
    pub delivery: MessageDeliveryState,
    pub is_mine: bool,
}

impl ChatMessage {
    pub fn conversation_key(&self) -> String {
        conversation_key(&self.sender_id, &self.recipient_id)
    }

    /// The participant that is not `user_id`.
    pub fn other_party(&self, user_id: &str) -> String {
        if self.sender_id == user_id {
            self.recipient_id.clone()
        } else {
            self.sender_id.clone()
        }
    }
}

/// Lifecycle of an outgoing message. `Sending` exists only on this client,
/// before the server acknowledges the send.
#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    Sending,
    Failed { reason: String },
    Sent,
    Delivered,
    Read,
}

impl MessageDeliveryState {
    /// Position in the forward progression. Transitions only ever move to a
    /// higher rank; a late `Delivered` arriving after `Read` is dropped.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            MessageDeliveryState::Sending => 0,
            MessageDeliveryState::Failed { .. } => 1,
            MessageDeliveryState::Sent => 2,
            MessageDeliveryState::Delivered => 3,
            MessageDeliveryState::Read => 4,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: Option<String>,
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub read: bool,
    pub category: NotificationCategory,
    pub deeplink: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NotificationCategory {
    Message,
    Activity,
    Measurement,
    System,
}

/// Input to `NotificationStore::add`. A missing id or timestamp is assigned
/// by the store.
#[derive(uniffi::Record, Clone, Debug)]
pub struct NotificationDraft {
    pub id: Option<String>,
    pub title: Option<String>,
    pub message: String,
    pub timestamp: Option<i64>,
    pub category: NotificationCategory,
    pub deeplink: Option<String>,
    pub data: HashMap<String, String>,
}

/// Event delivered by the push socket. The socket transport itself lives in
/// the native shell; delivery is best-effort and the poll channel is the
/// consistency backstop.
#[derive(uniffi::Enum, Clone, Debug)]
pub enum PushEvent {
    NewMessage {
        message: ChatMessage,
    },
    Typing {
        user_id: String,
        is_typing: bool,
    },
    ReadReceipt {
        conversation_key: String,
    },
    MessageDelivered {
        conversation_key: String,
        message_id: String,
    },
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_is_order_independent() {
        assert_eq!(
            conversation_key("alice", "bob"),
            conversation_key("bob", "alice")
        );
        assert_eq!(conversation_key("alice", "bob"), "alice:bob");
    }

    #[test]
    fn delivery_rank_follows_the_lifecycle() {
        let chain = [
            MessageDeliveryState::Sending,
            MessageDeliveryState::Failed {
                reason: "net".into(),
            },
            MessageDeliveryState::Sent,
            MessageDeliveryState::Delivered,
            MessageDeliveryState::Read,
        ];
        for w in chain.windows(2) {
            assert!(w[0].rank() < w[1].rank());
        }
    }
}
