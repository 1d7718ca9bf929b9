mod actions;
mod api;
mod core;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use api::ApiError;
pub use crate::core::{
    NotificationObserver, NotificationStore, NotificationSubscription, NOTIFICATION_CAP,
};
pub use state::*;
pub use updates::*;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    notifications: Arc<NotificationStore>,
}

#[uniffi::export]
impl FfiApp {
    /// Build the core for one authenticated user and start the app actor.
    /// Auth itself lives in the native shell; the core is user-scoped from
    /// birth.
    #[uniffi::constructor]
    pub fn new(data_dir: String, user_id: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, user_id = %user_id, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty(user_id.clone())));
        let notifications = NotificationStore::open(data_dir.clone(), user_id.clone());

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let notifications_for_core = notifications.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                user_id,
                shared_for_core,
                notifications_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            notifications,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Entry point for the push socket owned by the native shell: decoded
    /// events are forwarded into the core channel, where the actor filters
    /// and merges them. Delivery is best-effort; the poll channel is the
    /// consistency backstop.
    pub fn push_channel_event(&self, event: PushEvent) {
        let _ = self
            .core_tx
            .send(CoreMsg::Internal(Box::new(InternalEvent::PushReceived {
                event,
            })));
    }

    /// The user-scoped notification store. Shared with the core (which
    /// appends message alerts) and with any feature that wants to raise or
    /// observe notifications.
    pub fn notifications(&self) -> Arc<NotificationStore> {
        self.notifications.clone()
    }
}
