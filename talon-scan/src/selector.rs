use talon_core::{InventorySnapshot, SeatOffering};

/// Primary selection policy: the first offering flagged available, in
/// snapshot order. The upstream already orders by departure time; no re-sort
/// happens here, and selection is re-evaluated from scratch on every scan.
pub fn first_available(snapshot: &InventorySnapshot) -> Option<&SeatOffering> {
    snapshot.offerings.iter().find(|o| o.available)
}

/// Alternate mode: visit the offerings of one fixed snapshot cyclically,
/// wrapping after the last, ignoring the recorded availability flag. The
/// claim call itself reveals whether a seat opened up.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    next: usize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next offering to visit, or None on an empty snapshot.
    pub fn advance<'a>(&mut self, snapshot: &'a InventorySnapshot) -> Option<&'a SeatOffering> {
        if snapshot.offerings.is_empty() {
            return None;
        }
        let offering = &snapshot.offerings[self.next % snapshot.offerings.len()];
        self.next = (self.next + 1) % snapshot.offerings.len();
        Some(offering)
    }
}
