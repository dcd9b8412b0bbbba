use crate::session::{PollSession, PollStrategy, SessionStatus};
use std::sync::Arc;
use std::time::Duration;
use talon_core::{ConfigError, Credentials, Notifier, RailConnector, WatchPlan};
use talon_shared::StatusEvent;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// A running watch session owned by a tokio task. Dropping the handle does
/// not stop the session; call `abort` for external termination.
pub struct SessionHandle {
    id: Uuid,
    plan: WatchPlan,
    strategy: PollStrategy,
    events: broadcast::Sender<StatusEvent>,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn plan(&self) -> &WatchPlan {
        &self.plan
    }

    pub fn strategy(&self) -> PollStrategy {
        self.strategy
    }

    /// Latest status snapshot published by the session.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to the session's status event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// External termination: cancels the session at its next await point.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Validates the config, then runs the session on its own tokio task.
pub fn spawn(
    plan: WatchPlan,
    credentials: Credentials,
    strategy: PollStrategy,
    scan_retry: Duration,
    connector: Arc<dyn RailConnector>,
    notifier: Arc<dyn Notifier>,
) -> Result<SessionHandle, ConfigError> {
    let session = PollSession::new(
        plan.clone(),
        credentials,
        strategy,
        scan_retry,
        connector,
        notifier,
    )?;
    let id = Uuid::new_v4();
    let events = session.event_sender();
    let status = session.status_receiver();
    let route = plan.route_label();

    let task = tokio::spawn(async move {
        match session.run().await {
            Ok(result) => info!(
                watch = %id,
                confirmation = %result.confirmation_code,
                "watch finished: seat claimed"
            ),
            Err(e) => error!(watch = %id, "watch stopped before polling: {e}"),
        }
    });
    info!(watch = %id, route = %route, "watch session spawned");

    Ok(SessionHandle {
        id,
        plan,
        strategy,
        events,
        status,
        task,
    })
}
