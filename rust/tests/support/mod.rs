#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use stride_core::{AppReconciler, AppUpdate, FfiApp, Notification, NotificationObserver};
use tempfile::TempDir;

pub fn write_config(data_dir: &str, disable_network: bool) {
    let path = std::path::Path::new(data_dir).join("stride_config.json");
    let v = serde_json::json!({
        "disable_network": disable_network,
        "poll_interval_ms": 250,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

/// Fresh app in deterministic offline mode, logged in as "alice".
pub fn offline_app() -> (TempDir, Arc<FfiApp>) {
    let dir = tempfile::tempdir().unwrap();
    write_config(&dir.path().to_string_lossy(), true);
    let app = FfiApp::new(
        dir.path().to_string_lossy().to_string(),
        "alice".to_string(),
    );
    (dir, app)
}

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    pub fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

pub struct TestNotificationObserver {
    snapshots: Arc<Mutex<Vec<Vec<Notification>>>>,
}

impl TestNotificationObserver {
    pub fn new() -> (Self, Arc<Mutex<Vec<Vec<Notification>>>>) {
        let snapshots = Arc::new(Mutex::new(vec![]));
        (
            Self {
                snapshots: snapshots.clone(),
            },
            snapshots,
        )
    }
}

impl NotificationObserver for TestNotificationObserver {
    fn notifications_changed(&self, notifications: Vec<Notification>) {
        self.snapshots.lock().unwrap().push(notifications);
    }
}
