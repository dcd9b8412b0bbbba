pub mod connector;
pub mod error;
pub mod models;
pub mod stations;

pub use connector::{Notifier, RailConnector, RailSession};
pub use error::{
    ClaimRejection, ConfigError, ConnectError, NotifyError, ScanError, SessionError,
};
pub use models::{
    AcquisitionResult, Credentials, IntervalBounds, InventorySnapshot, SeatOffering,
    SeatPreference, WatchPlan,
};
pub use stations::StationCode;
