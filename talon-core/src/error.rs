/// Pre-loop validation failures. A session carrying one of these never starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Credentials missing: member id and password are both required")]
    MissingCredentials,

    #[error("Invalid interval bounds: min {min}s, max {max}s (need 0 < min <= max)")]
    InvalidInterval { min: u64, max: u64 },

    #[error("Invalid time window: {start} is after {end}")]
    InvalidWindow { start: String, end: String },

    #[error("Invalid station code: {0}")]
    InvalidStation(String),
}

/// Client construction failures. Fatal: reported once, the loop never runs.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Carrier unreachable: {0}")]
    Unreachable(String),
}

/// A transient inventory query failure. Retried after a fixed short backoff;
/// never terminates the session.
#[derive(Debug, thiserror::Error)]
#[error("Inventory query failed: {0}")]
pub struct ScanError(pub String);

/// The upstream declined a claim. Transient: the loop returns to polling and
/// the offering is not blacklisted.
#[derive(Debug, thiserror::Error)]
pub enum ClaimRejection {
    #[error("Offering sold out between scan and claim")]
    SoldOut,

    #[error("Requested seat class not available on this offering")]
    PreferenceUnavailable,

    #[error("Claim refused by carrier: {0}")]
    Refused(String),
}

/// Notification delivery failure. Logged and swallowed; never reaches the loop.
#[derive(Debug, thiserror::Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// What a session run can surface upward. Once polling starts the loop only
/// stops on success or external abort, so everything here is pre-loop.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Initial scan returned no offerings to visit in round-robin mode")]
    EmptyTimetable,
}
