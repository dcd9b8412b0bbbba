use crate::error::ConfigError;
use crate::stations::StationCode;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use talon_shared::Masked;

/// Seat class preference applied when claiming an offering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatPreference {
    GeneralFirst,
    GeneralOnly,
    SpecialFirst,
    SpecialOnly,
}

/// Bounds for the jittered idle wait between polls, in whole seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntervalBounds {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl IntervalBounds {
    pub fn new(min_secs: u64, max_secs: u64) -> Result<Self, ConfigError> {
        if min_secs == 0 || min_secs > max_secs {
            return Err(ConfigError::InvalidInterval {
                min: min_secs,
                max: max_secs,
            });
        }
        Ok(Self { min_secs, max_secs })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        Self::new(self.min_secs, self.max_secs).map(|_| ())
    }
}

/// Carrier login. The password never appears in Debug output or logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub member_id: String,
    pub password: Masked<String>,
}

impl Credentials {
    pub fn new(member_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            password: Masked::new(password.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.member_id.trim().is_empty() && !self.password.expose().trim().is_empty()
    }
}

/// Everything one watch session needs to know about what it is hunting.
/// Immutable for the lifetime of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchPlan {
    pub origin: StationCode,
    pub destination: StationCode,
    pub travel_date: NaiveDate,
    pub window_start: NaiveTime,
    /// Inclusive upper bound of the departure window.
    pub window_end: NaiveTime,
    pub preference: SeatPreference,
    pub interval: IntervalBounds,
}

impl WatchPlan {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_start > self.window_end {
            return Err(ConfigError::InvalidWindow {
                start: self.window_start.format("%H:%M").to_string(),
                end: self.window_end.format("%H:%M").to_string(),
            });
        }
        self.interval.validate()
    }

    /// "SSR -> BSN on 2026-09-01", operator-facing.
    pub fn route_label(&self) -> String {
        format!(
            "{} -> {} on {}",
            self.origin, self.destination, self.travel_date
        )
    }
}

/// One inventory line item as the upstream reports it. Produced fresh per
/// scan and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatOffering {
    pub id: String,
    pub train_name: String,
    pub departs_at: NaiveDateTime,
    pub arrives_at: NaiveDateTime,
    pub available: bool,
    pub fare_amount: i32,
    pub fare_currency: String,
}

/// The result of one scan call: offerings in upstream order, untouched.
#[derive(Debug, Clone, Serialize)]
pub struct InventorySnapshot {
    pub offerings: Vec<SeatOffering>,
    pub captured_at: DateTime<Utc>,
}

impl InventorySnapshot {
    pub fn capture(offerings: Vec<SeatOffering>) -> Self {
        Self {
            offerings,
            captured_at: Utc::now(),
        }
    }

    pub fn available_count(&self) -> usize {
        self.offerings.iter().filter(|o| o.available).count()
    }
}

/// Produced only on a successful claim; the sole success exit of a session.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionResult {
    pub confirmation_code: String,
    pub offering: SeatOffering,
    pub claimed_at: DateTime<Utc>,
}
