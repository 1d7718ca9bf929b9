//! Persisted, user-scoped notification log with live observers.
//!
//! Independent of the messaging sync machinery: any feature may hold the
//! store (it is passed around explicitly, never a module-level singleton)
//! and append to it. One JSON file per user id in the app data dir; every
//! mutation is a single read-modify-write under one lock followed by a
//! synchronous emit of the full sorted snapshot to every observer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::state::{now_millis, Notification, NotificationDraft};

/// Most-recent entries kept; older ones are evicted on insert.
pub const NOTIFICATION_CAP: usize = 200;

#[uniffi::export(callback_interface)]
pub trait NotificationObserver: Send + Sync + 'static {
    /// Called synchronously with the full, newest-first list after every
    /// mutation. The list is a read-only snapshot; do not mutate it.
    fn notifications_changed(&self, notifications: Vec<Notification>);
}

type ObserverSet = Arc<Mutex<Vec<(u64, Box<dyn NotificationObserver>)>>>;

/// Handle returned by [`NotificationStore::subscribe`]; `cancel` removes the
/// observer. Dropping the handle without cancelling leaves the observer
/// registered.
#[derive(uniffi::Object)]
pub struct NotificationSubscription {
    id: u64,
    observers: ObserverSet,
}

#[uniffi::export]
impl NotificationSubscription {
    pub fn cancel(&self) {
        let mut observers = match self.observers.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        observers.retain(|(id, _)| *id != self.id);
    }
}

#[derive(Debug, thiserror::Error)]
enum StoreReadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

fn read_store(path: &Path) -> Result<Vec<Notification>, StoreReadError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(uniffi::Object)]
pub struct NotificationStore {
    path: PathBuf,
    items: Mutex<Vec<Notification>>,
    observers: ObserverSet,
    next_observer_id: AtomicU64,
}

#[uniffi::export]
impl NotificationStore {
    #[uniffi::constructor]
    pub fn open(data_dir: String, user_id: String) -> Arc<Self> {
        let _ = std::fs::create_dir_all(&data_dir);
        let path = Path::new(&data_dir).join(format!("notifications_{user_id}.json"));

        // A corrupt payload is treated as "no data": the fallback is explicit
        // here rather than buried in a parse helper.
        let mut items = match read_store(&path) {
            Ok(items) => items,
            Err(StoreReadError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(e) => {
                tracing::warn!(path = %path.display(), %e, "notification store unreadable, starting empty");
                vec![]
            }
        };
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(NOTIFICATION_CAP);

        Arc::new(Self {
            path,
            items: Mutex::new(items),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer_id: AtomicU64::new(1),
        })
    }

    /// Newest-first snapshot of the stored list.
    pub fn items(&self) -> Vec<Notification> {
        self.lock_items().clone()
    }

    pub fn unread_count(&self) -> u32 {
        self.lock_items().iter().filter(|n| !n.read).count() as u32
    }

    /// Append a notification. No-op (returns false) when a duplicate is
    /// already stored: same id, or same non-empty deeplink with the same
    /// message text.
    pub fn add(&self, draft: NotificationDraft) -> bool {
        let snapshot = {
            let mut items = self.lock_items();

            let duplicate = items.iter().any(|existing| {
                if let Some(id) = draft.id.as_deref() {
                    if existing.id == id {
                        return true;
                    }
                }
                match draft.deeplink.as_deref() {
                    Some(link) if !link.is_empty() => {
                        existing.deeplink.as_deref() == Some(link)
                            && existing.message == draft.message
                    }
                    _ => false,
                }
            });
            if duplicate {
                return false;
            }

            let notification = Notification {
                id: draft
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                title: draft.title,
                message: draft.message,
                timestamp: draft.timestamp.unwrap_or_else(now_millis),
                read: false,
                category: draft.category,
                deeplink: draft.deeplink,
                data: draft.data,
            };

            items.insert(0, notification);
            items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            items.truncate(NOTIFICATION_CAP);
            items.clone()
        };

        self.persist(&snapshot);
        self.emit(snapshot);
        true
    }

    pub fn mark_read(&self, id: String) {
        let snapshot = {
            let mut items = self.lock_items();
            for n in items.iter_mut().filter(|n| n.id == id) {
                n.read = true;
            }
            items.clone()
        };
        self.persist(&snapshot);
        self.emit(snapshot);
    }

    pub fn mark_all_read(&self) {
        let snapshot = {
            let mut items = self.lock_items();
            for n in items.iter_mut() {
                n.read = true;
            }
            items.clone()
        };
        self.persist(&snapshot);
        self.emit(snapshot);
    }

    pub fn clear_all(&self) {
        {
            let mut items = self.lock_items();
            items.clear();
        }
        self.persist(&[]);
        self.emit(vec![]);
    }

    pub fn subscribe(&self, observer: Box<dyn NotificationObserver>) -> Arc<NotificationSubscription> {
        let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut observers = match self.observers.lock() {
                Ok(g) => g,
                Err(poison) => poison.into_inner(),
            };
            observers.push((id, observer));
        }
        Arc::new(NotificationSubscription {
            id,
            observers: self.observers.clone(),
        })
    }
}

impl NotificationStore {
    fn lock_items(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        match self.items.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn persist(&self, items: &[Notification]) {
        match serde_json::to_string(items) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(path = %self.path.display(), %e, "notification store write failed");
                }
            }
            Err(e) => tracing::warn!(%e, "notification store serialize failed"),
        }
    }

    fn emit(&self, snapshot: Vec<Notification>) {
        let observers = match self.observers.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        for (_, observer) in observers.iter() {
            observer.notifications_changed(snapshot.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NotificationCategory;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn draft(message: &str, timestamp: i64) -> NotificationDraft {
        NotificationDraft {
            id: None,
            title: None,
            message: message.to_string(),
            timestamp: Some(timestamp),
            category: NotificationCategory::System,
            deeplink: None,
            data: HashMap::new(),
        }
    }

    fn open(dir: &Path) -> Arc<NotificationStore> {
        NotificationStore::open(dir.to_string_lossy().to_string(), "alice".to_string())
    }

    struct CountingObserver {
        emits: Arc<Mutex<Vec<usize>>>,
    }

    impl NotificationObserver for CountingObserver {
        fn notifications_changed(&self, notifications: Vec<Notification>) {
            self.emits.lock().unwrap().push(notifications.len());
        }
    }

    #[test]
    fn cap_keeps_the_200_most_recent() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        for i in 0..201 {
            assert!(store.add(draft(&format!("n{i}"), 1_000 + i)));
        }

        let items = store.items();
        assert_eq!(items.len(), NOTIFICATION_CAP);
        // Newest first; the oldest (t=1000) was evicted.
        assert_eq!(items[0].timestamp, 1_200);
        assert_eq!(items.last().unwrap().timestamp, 1_001);
    }

    #[test]
    fn dedupe_by_deeplink_and_message() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        let mut first = draft("m", 10);
        first.deeplink = Some("x".to_string());
        let mut second = draft("m", 20);
        second.deeplink = Some("x".to_string());

        assert!(store.add(first));
        assert!(!store.add(second));
        assert_eq!(store.items().len(), 1);

        // Same deeplink, different message: not a duplicate.
        let mut third = draft("other", 30);
        third.deeplink = Some("x".to_string());
        assert!(store.add(third));
        assert_eq!(store.items().len(), 2);
    }

    #[test]
    fn dedupe_by_id() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        let mut first = draft("a", 10);
        first.id = Some("n1".to_string());
        let mut second = draft("b", 20);
        second.id = Some("n1".to_string());

        assert!(store.add(first));
        assert!(!store.add(second));
        assert_eq!(store.items().len(), 1);
    }

    #[test]
    fn empty_deeplink_never_dedupes() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        let mut first = draft("m", 10);
        first.deeplink = Some(String::new());
        let mut second = draft("m", 20);
        second.deeplink = Some(String::new());

        assert!(store.add(first));
        assert!(store.add(second));
        assert_eq!(store.items().len(), 2);
    }

    #[test]
    fn mark_read_and_mark_all_read() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.add(draft("a", 10));
        store.add(draft("b", 20));
        assert_eq!(store.unread_count(), 2);

        let id = store.items()[0].id.clone();
        store.mark_read(id.clone());
        assert_eq!(store.unread_count(), 1);
        assert!(store.items().iter().find(|n| n.id == id).unwrap().read);

        store.mark_all_read();
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn clear_all_empties_store_and_file() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.add(draft("a", 10));
        store.clear_all();
        assert!(store.items().is_empty());

        // A second instance sees the cleared state.
        let reopened = open(dir.path());
        assert!(reopened.items().is_empty());
    }

    #[test]
    fn persists_across_instances() {
        let dir = tempdir().unwrap();
        {
            let store = open(dir.path());
            store.add(draft("a", 10));
            store.add(draft("b", 20));
        }
        let reopened = open(dir.path());
        let items = reopened.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].message, "b");
    }

    #[test]
    fn corrupt_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("notifications_alice.json"),
            "{not json at all",
        )
        .unwrap();

        let store = open(dir.path());
        assert!(store.items().is_empty());
        // And the store still works afterwards.
        assert!(store.add(draft("a", 10)));
        assert_eq!(store.items().len(), 1);
    }

    #[test]
    fn observers_get_snapshots_until_cancelled() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        let emits = Arc::new(Mutex::new(vec![]));
        let sub = store.subscribe(Box::new(CountingObserver {
            emits: emits.clone(),
        }));

        store.add(draft("a", 10));
        store.add(draft("b", 20));
        assert_eq!(*emits.lock().unwrap(), vec![1, 2]);

        sub.cancel();
        store.add(draft("c", 30));
        assert_eq!(*emits.lock().unwrap(), vec![1, 2]);
    }
}
