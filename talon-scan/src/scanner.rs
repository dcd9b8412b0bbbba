use std::sync::Arc;
use talon_core::{InventorySnapshot, RailSession, ScanError, WatchPlan};
use tracing::debug;

/// Fetches inventory snapshots from an authenticated carrier session.
/// Returns the upstream result as-is: full window, upstream order,
/// unavailable offerings included.
pub struct Scanner {
    session: Arc<dyn RailSession>,
}

impl Scanner {
    pub fn new(session: Arc<dyn RailSession>) -> Self {
        Self { session }
    }

    pub async fn fetch(&self, plan: &WatchPlan) -> Result<InventorySnapshot, ScanError> {
        let offerings = self.session.scan(plan).await?;
        let snapshot = InventorySnapshot::capture(offerings);
        debug!(
            total = snapshot.offerings.len(),
            available = snapshot.available_count(),
            route = %plan.route_label(),
            "scan completed"
        );
        Ok(snapshot)
    }
}
