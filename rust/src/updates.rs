use crate::state::{AppState, ChatMessage, ConversationSummary, PushEvent};
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// Ephemeral typing indicator for the open conversation. Never stored in
    /// `AppState`; expiry is the UI's responsibility.
    TypingChanged {
        rev: u64,
        user_id: String,
        is_typing: bool,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::TypingChanged { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Inbound sync paths. Push and poll both land here, so the actor is the
    // single merge point for every source of messages.
    PushReceived {
        event: PushEvent,
    },
    HistoryFetched {
        other_user_id: String,
        messages: Vec<ChatMessage>,
        error: Option<String>,
    },
    PollCompleted {
        other_user_id: String,
        messages: Vec<ChatMessage>,
    },

    // Async results
    SendCompleted {
        other_user_id: String,
        temp_id: String,
        message: Option<ChatMessage>,
        error: Option<String>,
    },
    ConversationsFetched {
        summaries: Vec<ConversationSummary>,
        error: Option<String>,
    },
    UnreadCountFetched {
        count: u32,
    },
    Toast(String),
}
