use crate::error::{ClaimRejection, ConnectError, NotifyError, ScanError};
use crate::models::{AcquisitionResult, Credentials, SeatOffering, SeatPreference, WatchPlan};
use async_trait::async_trait;
use std::sync::Arc;

/// Entry point to a rail carrier backend. Connecting authenticates the
/// credentials and yields a session; failure is fatal for the watch.
#[async_trait]
pub trait RailConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn RailSession>, ConnectError>;
}

/// An authenticated carrier session. Within one watch session these calls are
/// issued strictly sequentially; implementations need not serialize claims.
#[async_trait]
pub trait RailSession: Send + Sync {
    /// Fetch every offering departing inside the plan's inclusive window, in
    /// upstream order, including unavailable ones. No filtering.
    async fn scan(&self, plan: &WatchPlan) -> Result<Vec<SeatOffering>, ScanError>;

    /// Attempt to reserve one offering with the given seat class preference.
    async fn claim(
        &self,
        offering: &SeatOffering,
        preference: SeatPreference,
    ) -> Result<AcquisitionResult, ClaimRejection>;
}

/// Best-effort operator notification channel. Callers log and swallow
/// failures; delivery never affects loop control flow.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}
