//! Per-conversation sync: a one-shot history fetch plus a fixed-interval
//! incremental poll, both feeding the core channel. Push events arrive
//! through the same channel (`InternalEvent::PushReceived`), so the actor is
//! the single merge point and the relative order of poll and push does not
//! matter: the timeline's id dedupe is the backstop.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flume::Sender;

use crate::api::MessagingApi;
use crate::state::now_millis;
use crate::updates::{CoreMsg, InternalEvent};

/// The poll channel's "new since" watermark (epoch ms).
///
/// Starts at "now" and only ever advances: responses can complete out of
/// order, and a stale response must never rewind the watermark into a range
/// that was already fetched.
pub(super) struct Cursor(AtomicI64);

impl Cursor {
    pub(super) fn starting_now() -> Self {
        Self(AtomicI64::new(now_millis()))
    }

    pub(super) fn since(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Advance to `ts` unless the cursor is already past it.
    pub(super) fn advance(&self, ts: i64) {
        self.0.fetch_max(ts, Ordering::SeqCst);
    }
}

/// Owns the sync machinery for one open conversation. Dropping it (or
/// calling `shutdown`) aborts the poll task; a leaked poller would keep
/// merging into a store the view no longer observes.
pub(super) struct SyncScheduler {
    other_user_id: String,
    cursor: Arc<Cursor>,
    poll_task: Option<tokio::task::JoinHandle<()>>,
}

impl SyncScheduler {
    /// Offline variant: cursor only, no poll task. Used when networking is
    /// disabled so tests drive the same code paths via injected events.
    pub(super) fn offline(other_user_id: String) -> Self {
        Self {
            other_user_id,
            cursor: Arc::new(Cursor::starting_now()),
            poll_task: None,
        }
    }

    pub(super) fn spawn(
        runtime: &tokio::runtime::Runtime,
        api: MessagingApi,
        other_user_id: String,
        interval: Duration,
        core_tx: Sender<CoreMsg>,
    ) -> Self {
        let cursor = Arc::new(Cursor::starting_now());
        let cursor_for_task = cursor.clone();
        let other_for_task = other_user_id.clone();

        let poll_task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let since = cursor_for_task.since();
                match api.fetch_new_since(&other_for_task, since).await {
                    Ok(messages) => {
                        if messages.is_empty() {
                            continue;
                        }
                        let _ = core_tx.send(CoreMsg::Internal(Box::new(
                            InternalEvent::PollCompleted {
                                other_user_id: other_for_task.clone(),
                                messages,
                            },
                        )));
                    }
                    Err(e) => {
                        // Self-healing: the next tick retries from the same cursor.
                        tracing::warn!(other_user = %other_for_task, %e, "poll fetch failed");
                    }
                }
            }
        });

        Self {
            other_user_id,
            cursor,
            poll_task: Some(poll_task),
        }
    }

    pub(super) fn other_user_id(&self) -> &str {
        &self.other_user_id
    }

    pub(super) fn advance_cursor(&self, ts: i64) {
        self.cursor.advance(ts);
    }

    pub(super) fn shutdown(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
