// Inbox summaries: local upserts keep the list live, server refetches make
// it authoritative.

use super::*;

impl AppCore {
    /// Request a server refetch of the summary list. Calls while one is in
    /// flight are coalesced into a single follow-up fetch.
    pub(super) fn invalidate_conversations(&mut self) {
        if !self.network_enabled() {
            return;
        }
        if self.conversations_fetch_in_flight {
            self.conversations_fetch_dirty = true;
            return;
        }
        self.conversations_fetch_in_flight = true;

        let api = self.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let (summaries, error) = match api.fetch_conversations().await {
                Ok(s) => (s, None),
                Err(e) => (vec![], Some(e.to_string())),
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ConversationsFetched { summaries, error },
            )));
        });
    }

    pub(super) fn handle_conversations_fetched(
        &mut self,
        summaries: Vec<ConversationSummary>,
        error: Option<String>,
    ) {
        self.conversations_fetch_in_flight = false;
        if self.conversations_fetch_dirty {
            self.conversations_fetch_dirty = false;
            self.invalidate_conversations();
        }

        if let Some(e) = error {
            // Self-healing: the next invalidation refetches.
            tracing::warn!(%e, "conversation list fetch failed");
            return;
        }

        let mut list = summaries;
        // The open conversation was already marked read locally; a lagging
        // server count must not resurrect its badge.
        if let Some(open) = self.state.current_conversation.as_ref() {
            for summary in list.iter_mut() {
                if summary.other_user_id == open.other_user_id {
                    summary.unread_count = 0;
                }
            }
        }
        self.state.conversations = list;
        self.sort_conversations();
        self.recompute_total_unread();
        self.emit_conversations();
    }

    /// Update (or create) the summary for one conversation after a message
    /// moved through it. `last_*` fields only advance forward in time.
    pub(super) fn upsert_summary(
        &mut self,
        other_user_id: &str,
        last_message: &str,
        last_sender_id: &str,
        at: i64,
        bump_unread: bool,
    ) {
        let idx = match self
            .state
            .conversations
            .iter()
            .position(|c| c.other_user_id == other_user_id)
        {
            Some(i) => i,
            None => {
                self.state.conversations.push(ConversationSummary {
                    other_user_id: other_user_id.to_string(),
                    // Placeholder until the next server refetch fills it in.
                    other_user_name: other_user_id.to_string(),
                    other_user_avatar: None,
                    last_message: None,
                    last_sender_id: None,
                    last_message_at: None,
                    unread_count: 0,
                });
                self.state.conversations.len() - 1
            }
        };
        let summary = &mut self.state.conversations[idx];

        if summary.last_message_at.map(|t| at >= t).unwrap_or(true) {
            summary.last_message = Some(last_message.to_string());
            summary.last_sender_id = Some(last_sender_id.to_string());
            summary.last_message_at = Some(at);
        }
        if bump_unread {
            summary.unread_count += 1;
        }

        self.sort_conversations();
        self.recompute_total_unread();
    }

    /// Zero the unread badge and tell the server. Called once per
    /// conversation-open, not per message.
    pub(super) fn mark_conversation_read(&mut self, other_user_id: &str) {
        if let Some(summary) = self
            .state
            .conversations
            .iter_mut()
            .find(|c| c.other_user_id == other_user_id)
        {
            summary.unread_count = 0;
        }
        self.recompute_total_unread();

        if !self.network_enabled() {
            return;
        }
        let api = self.api.clone();
        let other = other_user_id.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = api.mark_conversation_read(&other).await {
                // Last-writer-wins on read state; the badge is already zeroed
                // locally and the next summary fetch reconciles.
                tracing::warn!(other_user = %other, %e, "mark read failed");
            }
        });
    }

    pub(super) fn fetch_unread_count(&mut self) {
        if !self.network_enabled() {
            return;
        }
        let api = self.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            match api.fetch_unread_count().await {
                Ok(count) => {
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::UnreadCountFetched { count },
                    )));
                }
                Err(e) => tracing::warn!(%e, "unread count fetch failed"),
            }
        });
    }

    pub(super) fn sort_conversations(&mut self) {
        self.state
            .conversations
            .sort_by_key(|c| std::cmp::Reverse(c.last_message_at.unwrap_or(0)));
    }

    pub(super) fn recompute_total_unread(&mut self) {
        self.state.total_unread = self
            .state
            .conversations
            .iter()
            .map(|c| c.unread_count)
            .sum();
    }
}
