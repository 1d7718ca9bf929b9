//! In-memory projection of one conversation's message list.
//!
//! Every inbound channel (history fetch, poll, push) and the optimistic send
//! path land in the same `merge`/`replace` entry points, so the projection
//! stays consistent no matter how the channels interleave. `merge` is
//! idempotent and commutative over input batches: the union of whatever poll
//! and push deliver, deduplicated by id and re-sorted, is the timeline.

use std::collections::HashSet;

use crate::state::{ChatMessage, MessageDeliveryState, now_millis};

#[derive(Default)]
pub(super) struct MessageStore {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageStore {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub(super) fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    /// Merge a batch of messages. Entries whose id is already present are
    /// skipped; the rest are appended and the list re-sorted ascending by
    /// `created_at`. The sort is stable, so same-timestamp messages keep
    /// their relative arrival order. Returns the number of new entries.
    pub(super) fn merge(&mut self, incoming: Vec<ChatMessage>) -> usize {
        let mut added = 0;
        for msg in incoming {
            if self.ids.contains(&msg.id) {
                continue;
            }
            self.ids.insert(msg.id.clone());
            self.messages.push(msg);
            added += 1;
        }
        if added > 0 {
            self.messages.sort_by_key(|m| m.created_at);
        }
        added
    }

    /// Swap the optimistic temp entry for the server-confirmed message,
    /// in place, so the sender's own bubble does not visibly reorder.
    ///
    /// If the canonical id already arrived through poll or push, the temp
    /// entry is simply dropped, and the store holds exactly one entry per
    /// confirmed id either way.
    pub(super) fn replace(&mut self, temp_id: &str, final_msg: ChatMessage) -> bool {
        let Some(pos) = self.messages.iter().position(|m| m.id == temp_id) else {
            return false;
        };
        self.ids.remove(temp_id);
        if self.ids.contains(&final_msg.id) {
            self.messages.remove(pos);
        } else {
            self.ids.insert(final_msg.id.clone());
            self.messages[pos] = final_msg;
        }
        true
    }

    /// Advance a message's delivery state. Transitions are one-way: anything
    /// at or below the current rank is dropped, so a late `Delivered` ack
    /// cannot undo `Read`.
    pub(super) fn advance_delivery(&mut self, id: &str, next: MessageDeliveryState) -> bool {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if next.rank() <= msg.delivery.rank() {
            return false;
        }
        msg.delivery = next;
        true
    }

    /// Retry path only: put a failed message back into `Sending`.
    pub(super) fn restart_delivery(&mut self, id: &str) -> bool {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if !matches!(msg.delivery, MessageDeliveryState::Failed { .. }) {
            return false;
        }
        msg.delivery = MessageDeliveryState::Sending;
        true
    }

    /// Apply a read receipt for the whole conversation: every own message
    /// that reached the server is now read.
    pub(super) fn apply_read_receipt(&mut self) -> bool {
        let at = now_millis();
        let mut changed = false;
        for msg in self.messages.iter_mut().filter(|m| m.is_mine) {
            if msg.delivery.rank() >= MessageDeliveryState::Sent.rank()
                && msg.delivery != MessageDeliveryState::Read
            {
                msg.delivery = MessageDeliveryState::Read;
                msg.read_at.get_or_insert(at);
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, created_at: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: "bob".to_string(),
            recipient_id: "alice".to_string(),
            content: format!("msg {id}"),
            created_at,
            read_at: None,
            delivery: MessageDeliveryState::Sent,
            is_mine: false,
        }
    }

    fn own(id: &str, created_at: i64, delivery: MessageDeliveryState) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: "alice".to_string(),
            recipient_id: "bob".to_string(),
            content: format!("msg {id}"),
            created_at,
            read_at: None,
            delivery,
            is_mine: true,
        }
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn merge_is_idempotent() {
        let mut store = MessageStore::new();
        let batch = vec![msg("m1", 10), msg("m2", 20)];
        assert_eq!(store.merge(batch.clone()), 2);
        assert_eq!(store.merge(batch), 0);
        assert_eq!(ids(&store), vec!["m1", "m2"]);
    }

    #[test]
    fn merge_is_commutative_over_batches() {
        let a = vec![msg("m1", 10), msg("m3", 30)];
        let b = vec![msg("m2", 20), msg("m1", 10)];

        let mut ab = MessageStore::new();
        ab.merge(a.clone());
        ab.merge(b.clone());

        let mut ba = MessageStore::new();
        ba.merge(b);
        ba.merge(a);

        assert_eq!(ids(&ab), ids(&ba));
        assert_eq!(ids(&ab), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn merge_keeps_arrival_order_on_timestamp_ties() {
        let mut store = MessageStore::new();
        store.merge(vec![msg("first", 10)]);
        store.merge(vec![msg("second", 10), msg("third", 10)]);
        assert_eq!(ids(&store), vec!["first", "second", "third"]);
    }

    #[test]
    fn poll_then_push_of_same_message_inserts_once() {
        let mut store = MessageStore::new();
        store.merge(vec![msg("m1", 10)]);
        store.merge(vec![msg("m1", 10)]);
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn replace_preserves_position() {
        let mut store = MessageStore::new();
        store.merge(vec![msg("m1", 10), own("tmp1", 20, MessageDeliveryState::Sending), msg("m2", 30)]);

        // Server assigns a later timestamp; the bubble must not move.
        let mut confirmed = own("srv1", 35, MessageDeliveryState::Sent);
        confirmed.content = "msg tmp1".to_string();
        assert!(store.replace("tmp1", confirmed));
        assert_eq!(ids(&store), vec!["m1", "srv1", "m2"]);
    }

    #[test]
    fn replace_after_server_copy_already_merged_keeps_single_entry() {
        let mut store = MessageStore::new();
        store.merge(vec![own("tmp1", 20, MessageDeliveryState::Sending)]);
        // Poll raced the send ack and already delivered the canonical copy.
        store.merge(vec![own("srv1", 20, MessageDeliveryState::Sent)]);

        assert!(store.replace("tmp1", own("srv1", 20, MessageDeliveryState::Sent)));
        assert_eq!(ids(&store), vec!["srv1"]);
    }

    #[test]
    fn delivery_never_moves_backward() {
        let mut store = MessageStore::new();
        store.merge(vec![own("m1", 10, MessageDeliveryState::Sending)]);

        assert!(store.advance_delivery("m1", MessageDeliveryState::Sent));
        assert!(store.advance_delivery("m1", MessageDeliveryState::Read));
        // Late delivered ack after the read receipt.
        assert!(!store.advance_delivery("m1", MessageDeliveryState::Delivered));
        assert_eq!(store.messages()[0].delivery, MessageDeliveryState::Read);
    }

    #[test]
    fn failed_can_only_restart_from_failed() {
        let mut store = MessageStore::new();
        store.merge(vec![own("m1", 10, MessageDeliveryState::Sending)]);
        assert!(store.advance_delivery(
            "m1",
            MessageDeliveryState::Failed {
                reason: "net".into()
            }
        ));
        assert!(store.restart_delivery("m1"));
        assert_eq!(store.messages()[0].delivery, MessageDeliveryState::Sending);

        assert!(store.advance_delivery("m1", MessageDeliveryState::Sent));
        assert!(!store.restart_delivery("m1"));
    }

    #[test]
    fn read_receipt_marks_own_sent_messages_only() {
        let mut store = MessageStore::new();
        store.merge(vec![
            own("m1", 10, MessageDeliveryState::Sent),
            own("m2", 20, MessageDeliveryState::Sending),
            msg("m3", 30),
        ]);

        assert!(store.apply_read_receipt());
        assert_eq!(store.messages()[0].delivery, MessageDeliveryState::Read);
        assert!(store.messages()[0].read_at.is_some());
        // Unacknowledged and inbound messages are untouched.
        assert_eq!(store.messages()[1].delivery, MessageDeliveryState::Sending);
        assert_eq!(store.messages()[2].delivery, MessageDeliveryState::Sent);
    }
}
