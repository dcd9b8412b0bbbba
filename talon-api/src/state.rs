use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use talon_core::{Credentials, IntervalBounds, Notifier, RailConnector};
use talon_session::SessionHandle;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Fallbacks applied when a watch request omits optional fields.
#[derive(Clone)]
pub struct WatchDefaults {
    pub interval: IntervalBounds,
    pub scan_retry: Duration,
    pub credentials: Credentials,
}

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn RailConnector>,
    pub notifier: Arc<dyn Notifier>,
    pub defaults: WatchDefaults,
    pub watches: Arc<WatchRegistry>,
}

/// All live (and finished-but-not-forgotten) watch sessions, keyed by id.
#[derive(Default)]
pub struct WatchRegistry {
    inner: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: SessionHandle) -> Uuid {
        let id = handle.id();
        self.inner.write().await.insert(id, Arc::new(handle));
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.inner.write().await.remove(id)
    }
}
