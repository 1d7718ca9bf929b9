#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Conversation view
    OpenConversation {
        other_user_id: String,
    },
    CloseConversation,

    // Messaging
    SendMessage {
        other_user_id: String,
        content: String,
    },
    RetryMessage {
        message_id: String,
    },

    // Inbox
    RefreshConversations,

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::RefreshConversations => "RefreshConversations",
            AppAction::ClearToast => "ClearToast",
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
