use crate::app_config::SimConfig;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use talon_core::{
    AcquisitionResult, ClaimRejection, ConnectError, Credentials, RailConnector, RailSession,
    ScanError, SeatOffering, SeatPreference, WatchPlan,
};
use tracing::info;

/// Deterministic in-process carrier backend. Generates a stable timetable per
/// route and date from a seed and releases the mid-afternoon train after a
/// configured number of polls, so the binary runs end-to-end with no real
/// carrier and integration tests stay reproducible.
pub struct SimRailConnector {
    cfg: SimConfig,
}

impl SimRailConnector {
    pub fn new(cfg: SimConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl RailConnector for SimRailConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn RailSession>, ConnectError> {
        if !credentials.is_complete() {
            return Err(ConnectError::Auth(
                "member id and password are required".to_string(),
            ));
        }
        info!(member = %credentials.member_id, "simulated carrier session opened");
        Ok(Arc::new(SimRailSession {
            cfg: self.cfg.clone(),
            state: Mutex::new(SimState::default()),
        }))
    }
}

#[derive(Default)]
struct SimState {
    /// Scans and claim visits both count as polls against the carrier.
    polls: u64,
    claimed: HashSet<String>,
}

pub struct SimRailSession {
    cfg: SimConfig,
    state: Mutex<SimState>,
}

impl SimRailSession {
    /// Stable per route and date; independent of session history.
    fn timetable(&self, plan: &WatchPlan) -> Vec<SeatOffering> {
        let mut rng = StdRng::seed_from_u64(mix(&[
            self.cfg.seed.to_string().as_str(),
            plan.origin.as_str(),
            plan.destination.as_str(),
            &plan.travel_date.to_string(),
        ]));

        let trains = self.cfg.trains_per_day.max(1);
        let first_minute = 5 * 60;
        let span_minutes = 18 * 60;
        (0..trains)
            .map(|i| {
                let slot = first_minute + (span_minutes * i) / trains;
                let departs_minute: u32 = slot + rng.gen_range(0..20);
                let departs = plan.travel_date.and_time(
                    NaiveTime::from_num_seconds_from_midnight_opt(departs_minute * 60, 0)
                        .unwrap_or(NaiveTime::MIN),
                );
                let ride_minutes = rng.gen_range(140..170);
                SeatOffering {
                    id: (101 + i).to_string(),
                    train_name: format!("Express {}", 101 + i),
                    departs_at: departs,
                    arrives_at: departs + ChronoDuration::minutes(ride_minutes),
                    available: false,
                    fare_amount: 48_000 + rng.gen_range(0..80) * 100,
                    fare_currency: "KRW".to_string(),
                }
            })
            .collect()
    }

    /// Index of the train that opens up once `release_after_scans` polls have
    /// happened. Mid-afternoon, so it falls inside typical watch windows.
    fn release_pick(&self) -> u32 {
        self.cfg.trains_per_day.max(1) * 2 / 3
    }

    fn is_released(&self, train_index: u32, polls: u64) -> bool {
        if polls < self.cfg.release_after_scans {
            return false;
        }
        if train_index == self.release_pick() {
            return true;
        }
        if self.cfg.release_probability > 0.0 {
            let roll = mix(&[
                self.cfg.seed.to_string().as_str(),
                &train_index.to_string(),
                &polls.to_string(),
            ]);
            return (roll % 10_000) as f64 / 10_000.0 < self.cfg.release_probability;
        }
        false
    }

    fn has_special_car(&self, offering: &SeatOffering) -> bool {
        mix(&[self.cfg.seed.to_string().as_str(), &offering.id, "special"]) % 2 == 0
    }

    fn train_index(offering: &SeatOffering) -> Option<u32> {
        offering.id.parse::<u32>().ok()?.checked_sub(101)
    }
}

#[async_trait]
impl RailSession for SimRailSession {
    async fn scan(&self, plan: &WatchPlan) -> Result<Vec<SeatOffering>, ScanError> {
        let (polls, claimed) = {
            let mut state = self.state.lock().map_err(|_| poisoned())?;
            state.polls += 1;
            (state.polls, state.claimed.clone())
        };

        let mut offerings: Vec<SeatOffering> = self
            .timetable(plan)
            .into_iter()
            .filter(|o| {
                let dep = o.departs_at.time();
                dep >= plan.window_start && dep <= plan.window_end
            })
            .collect();
        for offering in &mut offerings {
            let released = Self::train_index(offering)
                .map(|i| self.is_released(i, polls))
                .unwrap_or(false);
            offering.available = released && !claimed.contains(&offering.id);
        }
        Ok(offerings)
    }

    async fn claim(
        &self,
        offering: &SeatOffering,
        preference: SeatPreference,
    ) -> Result<AcquisitionResult, ClaimRejection> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ClaimRejection::Refused("carrier session corrupted".to_string()))?;
        state.polls += 1;

        if state.claimed.contains(&offering.id) {
            return Err(ClaimRejection::SoldOut);
        }
        let released = Self::train_index(offering)
            .map(|i| self.is_released(i, state.polls))
            .unwrap_or(false);
        if !released {
            return Err(ClaimRejection::SoldOut);
        }
        if preference == SeatPreference::SpecialOnly && !self.has_special_car(offering) {
            return Err(ClaimRejection::PreferenceUnavailable);
        }

        state.claimed.insert(offering.id.clone());
        let code = mix(&[self.cfg.seed.to_string().as_str(), &offering.id, "claim"]);
        Ok(AcquisitionResult {
            confirmation_code: format!("SIM{:06X}", code & 0xFF_FFFF),
            offering: offering.clone(),
            claimed_at: Utc::now(),
        })
    }
}

fn poisoned() -> ScanError {
    ScanError("carrier session corrupted".to_string())
}

fn mix(parts: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use talon_core::{IntervalBounds, StationCode};

    fn cfg(release_after_scans: u64) -> SimConfig {
        SimConfig {
            seed: 42,
            trains_per_day: 6,
            release_after_scans,
            release_probability: 0.0,
        }
    }

    fn plan() -> WatchPlan {
        WatchPlan {
            origin: StationCode::parse("SSR").unwrap(),
            destination: StationCode::parse("BSN").unwrap(),
            travel_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            window_start: "00:00:00".parse().unwrap(),
            window_end: "23:59:59".parse().unwrap(),
            preference: SeatPreference::GeneralFirst,
            interval: IntervalBounds { min_secs: 1, max_secs: 1 },
        }
    }

    async fn session(release_after_scans: u64) -> Arc<dyn RailSession> {
        SimRailConnector::new(cfg(release_after_scans))
            .connect(&Credentials::new("member-1", "pw"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_rejects_blank_credentials() {
        let err = SimRailConnector::new(cfg(3))
            .connect(&Credentials::new("", ""))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::Auth(_)));
    }

    #[tokio::test]
    async fn test_timetable_is_deterministic_per_route() {
        let a = session(3).await.scan(&plan()).await.unwrap();
        let b = session(3).await.scan(&plan()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
    }

    #[tokio::test]
    async fn test_release_then_claim_succeeds_once() {
        let session = session(2).await;

        let first = session.scan(&plan()).await.unwrap();
        assert_eq!(first.iter().filter(|o| o.available).count(), 0);

        let second = session.scan(&plan()).await.unwrap();
        let target = second.iter().find(|o| o.available).expect("seat released");

        let result = session
            .claim(target, SeatPreference::GeneralFirst)
            .await
            .unwrap();
        assert!(result.confirmation_code.starts_with("SIM"));

        // Same seat again: sold out, and later scans no longer offer it.
        let again = session.claim(target, SeatPreference::GeneralFirst).await;
        assert!(matches!(again, Err(ClaimRejection::SoldOut)));
        let third = session.scan(&plan()).await.unwrap();
        assert!(third.iter().all(|o| o.id != target.id || !o.available));
    }

    #[tokio::test]
    async fn test_claim_before_release_is_rejected() {
        let session = session(10).await;
        let offerings = session.scan(&plan()).await.unwrap();
        let result = session
            .claim(&offerings[0], SeatPreference::GeneralFirst)
            .await;
        assert!(matches!(result, Err(ClaimRejection::SoldOut)));
    }
}
