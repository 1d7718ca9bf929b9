mod config;
mod conversations;
mod notifications;
mod sync;
mod timeline;

pub use notifications::{
    NotificationObserver, NotificationStore, NotificationSubscription, NOTIFICATION_CAP,
};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::api::MessagingApi;
use crate::state::{
    conversation_key, now_millis, AppState, ChatMessage, ConversationSummary,
    ConversationViewState, MessageDeliveryState, NotificationCategory, NotificationDraft,
    PushEvent,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use sync::SyncScheduler;
use timeline::MessageStore;

/// Everything needed to re-issue a send. Kept until the server confirms, so
/// a failed message can be retried with the same id and timestamp.
#[derive(Debug, Clone)]
struct PendingSend {
    other_user_id: String,
    content: String,
    created_at: i64,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,
    last_outgoing_ts: i64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    api: MessagingApi,
    notifications: Arc<NotificationStore>,

    // Projection of the open conversation, plus the sync machinery bound to
    // it. Both are torn down together when the view closes.
    timeline: MessageStore,
    active_sync: Option<SyncScheduler>,
    pending_sends: HashMap<String, PendingSend>,

    conversations_fetch_in_flight: bool,
    conversations_fetch_dirty: bool,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        user_id: String,
        shared_state: Arc<RwLock<AppState>>,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty(user_id.clone());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let api = MessagingApi::new(config.resolved_api_base_url(), user_id);

        let mut this = Self {
            state,
            rev: 0,
            last_outgoing_ts: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            api,
            notifications,
            timeline: MessageStore::new(),
            active_sync: None,
            pending_sends: HashMap::new(),
            conversations_fetch_in_flight: false,
            conversations_fetch_dirty: false,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);

        // Seed the inbox.
        this.invalidate_conversations();
        this.fetch_unread_count();
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_conversations(&mut self) {
        self.emit_state();
    }

    fn emit_current_conversation(&mut self) {
        self.emit_state();
    }

    fn emit_toast(&mut self) {
        self.emit_state();
    }

    fn emit_typing(&mut self, user_id: String, is_typing: bool) {
        let rev = self.next_rev();
        // Keep the snapshot rev in sync with the update stream even though
        // typing never touches stored state.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::TypingChanged {
            rev,
            user_id,
            is_typing,
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a late
        // listener still sees it in the snapshot.
        self.state.toast = Some(msg.into());
        self.emit_toast();
    }

    fn sync_timeline_into_state(&mut self) {
        if let Some(view) = self.state.current_conversation.as_mut() {
            view.messages = self.timeline.messages().to_vec();
        }
    }

    fn open_conversation_id(&self) -> Option<&str> {
        self.state
            .current_conversation
            .as_ref()
            .map(|c| c.other_user_id.as_str())
    }

    fn open_conversation_key(&self) -> Option<String> {
        self.open_conversation_id()
            .map(|other| conversation_key(&self.state.user_id, other))
    }

    /// Monotonic timestamps for outgoing messages: rapid sends must never
    /// share a timestamp or display order becomes nondeterministic.
    fn next_outgoing_ts(&mut self) -> i64 {
        let now = now_millis();
        if now <= self.last_outgoing_ts {
            self.last_outgoing_ts += 1;
        } else {
            self.last_outgoing_ts = now;
        }
        self.last_outgoing_ts
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it can contain message content.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::OpenConversation { other_user_id } => {
                if self.open_conversation_id() == Some(other_user_id.as_str()) {
                    // Already open; mark-read already ran for this open.
                    return;
                }
                self.teardown_sync();
                self.timeline.clear();

                self.mark_conversation_read(&other_user_id);

                let other_user_name = self
                    .state
                    .conversations
                    .iter()
                    .find(|c| c.other_user_id == other_user_id)
                    .map(|c| c.other_user_name.clone())
                    .unwrap_or_else(|| other_user_id.clone());
                self.state.current_conversation = Some(ConversationViewState {
                    other_user_id: other_user_id.clone(),
                    other_user_name,
                    messages: vec![],
                    history_loaded: false,
                });

                self.start_sync(other_user_id);
                self.emit_current_conversation();
            }
            AppAction::CloseConversation => {
                self.teardown_sync();
                self.timeline.clear();
                if self.state.current_conversation.take().is_some() {
                    self.emit_current_conversation();
                }
            }
            AppAction::SendMessage {
                other_user_id,
                content,
            } => {
                let content = content.trim().to_string();
                if content.is_empty() {
                    return;
                }

                let ts = self.next_outgoing_ts();
                let temp_id = uuid::Uuid::new_v4().to_string();
                let user_id = self.state.user_id.clone();

                // Optimistic UI: visible immediately, pending until acked.
                let message = ChatMessage {
                    id: temp_id.clone(),
                    sender_id: user_id.clone(),
                    recipient_id: other_user_id.clone(),
                    content: content.clone(),
                    created_at: ts,
                    read_at: None,
                    delivery: MessageDeliveryState::Sending,
                    is_mine: true,
                };
                if self.open_conversation_id() == Some(other_user_id.as_str()) {
                    self.timeline.merge(vec![message]);
                    self.sync_timeline_into_state();
                }

                self.pending_sends.insert(
                    temp_id.clone(),
                    PendingSend {
                        other_user_id: other_user_id.clone(),
                        content: content.clone(),
                        created_at: ts,
                    },
                );

                self.upsert_summary(&other_user_id, &content, &user_id, ts, false);
                self.emit_state();

                self.dispatch_send(temp_id, other_user_id, content, ts);
            }
            AppAction::RetryMessage { message_id } => {
                let Some(pending) = self.pending_sends.get(&message_id).cloned() else {
                    self.toast("Nothing to retry");
                    return;
                };
                if self.open_conversation_id() == Some(pending.other_user_id.as_str()) {
                    self.timeline.restart_delivery(&message_id);
                    self.sync_timeline_into_state();
                }
                self.emit_state();
                self.dispatch_send(
                    message_id,
                    pending.other_user_id,
                    pending.content,
                    pending.created_at,
                );
            }
            AppAction::RefreshConversations => {
                self.invalidate_conversations();
            }
            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_toast();
                }
            }
            AppAction::Foregrounded => {
                self.invalidate_conversations();
                self.fetch_unread_count();
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::Toast(ref msg) => {
                tracing::info!(msg, "toast");
                self.toast(msg.clone());
            }
            InternalEvent::PushReceived { event } => self.handle_push_event(event),
            InternalEvent::HistoryFetched {
                other_user_id,
                messages,
                error,
            } => {
                // Stale if the view moved on while the fetch was in flight.
                if self.open_conversation_id() != Some(other_user_id.as_str()) {
                    return;
                }
                if let Some(e) = error {
                    tracing::warn!(other_user = %other_user_id, %e, "history fetch failed");
                    self.toast("Couldn't load messages");
                }
                self.timeline.merge(messages);
                if let Some(view) = self.state.current_conversation.as_mut() {
                    view.history_loaded = true;
                }
                self.sync_timeline_into_state();
                self.emit_current_conversation();
            }
            InternalEvent::PollCompleted {
                other_user_id,
                messages,
            } => {
                tracing::debug!(
                    other_user = %other_user_id,
                    count = messages.len(),
                    "poll_completed"
                );
                let Some(sync) = self.active_sync.as_ref() else {
                    return;
                };
                if sync.other_user_id() != other_user_id
                    || self.open_conversation_id() != Some(other_user_id.as_str())
                {
                    return;
                }
                let Some(latest) = messages.iter().max_by_key(|m| m.created_at).cloned() else {
                    return;
                };
                sync.advance_cursor(latest.created_at);

                if self.timeline.merge(messages) > 0 {
                    self.sync_timeline_into_state();
                    // The conversation is on screen, so new inbound messages
                    // never bump its unread badge.
                    self.upsert_summary(
                        &other_user_id,
                        &latest.content,
                        &latest.sender_id,
                        latest.created_at,
                        false,
                    );
                    self.emit_current_conversation();
                    self.invalidate_conversations();
                }
            }
            InternalEvent::SendCompleted {
                other_user_id,
                temp_id,
                message,
                error,
            } => {
                tracing::info!(
                    ok = message.is_some(),
                    ?error,
                    %other_user_id,
                    %temp_id,
                    "send_completed"
                );
                match message {
                    Some(confirmed) => {
                        self.pending_sends.remove(&temp_id);
                        if self.open_conversation_id() == Some(other_user_id.as_str()) {
                            if !self.timeline.replace(&temp_id, confirmed.clone()) {
                                // Temp entry gone (view was reopened); treat the
                                // confirmation as a normal inbound merge.
                                self.timeline.merge(vec![confirmed.clone()]);
                            }
                            self.sync_timeline_into_state();
                        }
                        self.upsert_summary(
                            &other_user_id,
                            &confirmed.content,
                            &confirmed.sender_id,
                            confirmed.created_at,
                            false,
                        );
                        self.emit_state();
                        self.invalidate_conversations();
                    }
                    None => {
                        let reason = error.unwrap_or_else(|| "send failed".into());
                        // Not rolled back: the bubble stays visible, marked
                        // failed, and can be retried.
                        if self.open_conversation_id() == Some(other_user_id.as_str()) {
                            self.timeline.advance_delivery(
                                &temp_id,
                                MessageDeliveryState::Failed {
                                    reason: reason.clone(),
                                },
                            );
                            self.sync_timeline_into_state();
                        }
                        tracing::warn!(%other_user_id, %reason, "message send failed");
                        self.toast("Message failed to send");
                    }
                }
            }
            InternalEvent::ConversationsFetched { summaries, error } => {
                self.handle_conversations_fetched(summaries, error);
            }
            InternalEvent::UnreadCountFetched { count } => {
                self.state.total_unread = count;
                self.emit_state();
            }
        }
    }

    fn handle_push_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::NewMessage { message } => {
                let user_id = self.state.user_id.clone();
                // Normalize shell-provided fields; the wire knows nothing of
                // local delivery bookkeeping.
                let mut message = message;
                message.is_mine = message.sender_id == user_id;
                message.delivery = if message.read_at.is_some() {
                    MessageDeliveryState::Read
                } else {
                    MessageDeliveryState::Sent
                };

                let key = message.conversation_key();
                let other = message.other_party(&user_id);
                tracing::debug!(message_id = %message.id, conversation = %key, "push_new_message");

                if self.open_conversation_key().as_deref() == Some(key.as_str()) {
                    // Same message may arrive via poll too; the id dedupe in
                    // merge makes the double delivery harmless.
                    if self.timeline.merge(vec![message.clone()]) > 0 {
                        self.sync_timeline_into_state();
                        self.upsert_summary(
                            &other,
                            &message.content,
                            &message.sender_id,
                            message.created_at,
                            false,
                        );
                        self.emit_current_conversation();
                        self.invalidate_conversations();
                    }
                } else {
                    let inbound = !message.is_mine;
                    self.upsert_summary(
                        &other,
                        &message.content,
                        &message.sender_id,
                        message.created_at,
                        inbound,
                    );
                    if inbound {
                        self.notify_inbound_message(&other, &message);
                    }
                    self.emit_state();
                    self.invalidate_conversations();
                }
            }
            PushEvent::Typing { user_id, is_typing } => {
                if self.open_conversation_id() == Some(user_id.as_str()) {
                    self.emit_typing(user_id, is_typing);
                }
            }
            PushEvent::ReadReceipt { conversation_key } => {
                if self.open_conversation_key().as_deref() == Some(conversation_key.as_str())
                    && self.timeline.apply_read_receipt()
                {
                    self.sync_timeline_into_state();
                    self.emit_current_conversation();
                }
            }
            PushEvent::MessageDelivered {
                conversation_key,
                message_id,
            } => {
                if self.open_conversation_key().as_deref() == Some(conversation_key.as_str())
                    && self
                        .timeline
                        .advance_delivery(&message_id, MessageDeliveryState::Delivered)
                {
                    self.sync_timeline_into_state();
                    self.emit_current_conversation();
                }
            }
        }
    }

    fn notify_inbound_message(&self, other_user_id: &str, message: &ChatMessage) {
        let sender_name = self
            .state
            .conversations
            .iter()
            .find(|c| c.other_user_id == other_user_id)
            .map(|c| c.other_user_name.clone());
        self.notifications.add(NotificationDraft {
            // Keyed by message id so redelivered pushes collapse.
            id: Some(format!("msg-{}", message.id)),
            title: sender_name,
            message: message.content.clone(),
            timestamp: Some(message.created_at),
            category: NotificationCategory::Message,
            deeplink: Some(format!("stride://conversations/{other_user_id}")),
            data: HashMap::from([("otherUserId".to_string(), other_user_id.to_string())]),
        });
    }

    fn start_sync(&mut self, other_user_id: String) {
        if self.network_enabled() {
            self.active_sync = Some(SyncScheduler::spawn(
                &self.runtime,
                self.api.clone(),
                other_user_id.clone(),
                self.poll_interval(),
                self.core_sender.clone(),
            ));

            let api = self.api.clone();
            let tx = self.core_sender.clone();
            let limit = self.history_page_size();
            self.runtime.spawn(async move {
                let (messages, error) = match api.fetch_history(&other_user_id, limit).await {
                    Ok(m) => (m, None),
                    Err(e) => (vec![], Some(e.to_string())),
                };
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::HistoryFetched {
                    other_user_id,
                    messages,
                    error,
                })));
            });
        } else {
            // Offline: no history to fetch, same code path for the view.
            self.active_sync = Some(SyncScheduler::offline(other_user_id.clone()));
            let _ = self
                .core_sender
                .send(CoreMsg::Internal(Box::new(InternalEvent::HistoryFetched {
                    other_user_id,
                    messages: vec![],
                    error: None,
                })));
        }
    }

    /// Closing the view must stop both channels: a leaked poller keeps
    /// merging into a projection nobody observes.
    fn teardown_sync(&mut self) {
        if let Some(mut sync) = self.active_sync.take() {
            sync.shutdown();
        }
    }

    fn dispatch_send(
        &mut self,
        temp_id: String,
        other_user_id: String,
        content: String,
        created_at: i64,
    ) {
        if !self.network_enabled() {
            // Deterministic tests: treat as an immediate server ack.
            let confirmed = ChatMessage {
                id: uuid::Uuid::new_v4().to_string(),
                sender_id: self.state.user_id.clone(),
                recipient_id: other_user_id.clone(),
                content,
                created_at,
                read_at: None,
                delivery: MessageDeliveryState::Sent,
                is_mine: true,
            };
            let _ = self
                .core_sender
                .send(CoreMsg::Internal(Box::new(InternalEvent::SendCompleted {
                    other_user_id,
                    temp_id,
                    message: Some(confirmed),
                    error: None,
                })));
            return;
        }

        let api = self.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let (message, error) = match api.send_message(&other_user_id, &content).await {
                Ok(m) => (Some(m), None),
                Err(e) => (None, Some(e.to_string())),
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendCompleted {
                other_user_id,
                temp_id,
                message,
                error,
            })));
        });
    }
}
