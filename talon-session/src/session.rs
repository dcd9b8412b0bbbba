use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use talon_core::{
    AcquisitionResult, ConfigError, Credentials, InventorySnapshot, Notifier, RailConnector,
    RailSession, SeatOffering, SessionError, WatchPlan,
};
use talon_scan::{first_available, jittered_delay, RoundRobinCursor, Scanner};
use talon_shared::{StatusEvent, StatusLevel};
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tracing::warn;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where a watch session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Init,
    Connecting,
    Scanning,
    Claiming,
    IdleWait,
    Success,
    Fatal,
}

/// How the session hunts. Rescan is the primary behavior: a fresh snapshot
/// every pass. RoundRobin is the compatibility alternate: one snapshot at
/// start, then cyclic per-item claim visits with no re-scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollStrategy {
    #[default]
    Rescan,
    RoundRobin,
}

/// Point-in-time view of a running session, published over a watch channel.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub iteration: u64,
    pub started_at: DateTime<Utc>,
    pub confirmation_code: Option<String>,
}

/// One run of the poll/detect/claim loop. Drives the Scanner, Selector and
/// claim call strictly sequentially; stops permanently on the first
/// successful claim and otherwise polls until externally aborted.
pub struct PollSession {
    plan: WatchPlan,
    credentials: Credentials,
    strategy: PollStrategy,
    scan_retry: Duration,
    connector: Arc<dyn RailConnector>,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<StatusEvent>,
    status: watch::Sender<SessionStatus>,
    state: SessionState,
    iteration: u64,
    started_at: DateTime<Utc>,
    confirmation_code: Option<String>,
}

impl PollSession {
    /// Validates the plan and credentials up front; a rejected config never
    /// enters any state and emits no events.
    pub fn new(
        plan: WatchPlan,
        credentials: Credentials,
        strategy: PollStrategy,
        scan_retry: Duration,
        connector: Arc<dyn RailConnector>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        if !credentials.is_complete() {
            return Err(ConfigError::MissingCredentials);
        }
        plan.validate()?;

        let started_at = Utc::now();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(SessionStatus {
            state: SessionState::Init,
            iteration: 0,
            started_at,
            confirmation_code: None,
        });

        Ok(Self {
            plan,
            credentials,
            strategy,
            scan_retry,
            connector,
            notifier,
            events,
            status,
            state: SessionState::Init,
            iteration: 0,
            started_at,
            confirmation_code: None,
        })
    }

    pub fn plan(&self) -> &WatchPlan {
        &self.plan
    }

    /// Sender handle for the status event stream; subscribe before `run`.
    pub fn event_sender(&self) -> broadcast::Sender<StatusEvent> {
        self.events.clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Runs to the first successful claim (or forever). Errors only before
    /// polling starts: a failed connect, or in round-robin mode an initial
    /// snapshot with nothing to visit.
    pub async fn run(mut self) -> Result<AcquisitionResult, SessionError> {
        self.enter(
            SessionState::Connecting,
            StatusLevel::Info,
            format!("connecting to carrier as {}", self.credentials.member_id),
        );

        let session = match self.connector.connect(&self.credentials).await {
            Ok(session) => session,
            Err(e) => {
                self.enter(
                    SessionState::Fatal,
                    StatusLevel::Error,
                    format!("connection failed: {e}"),
                );
                return Err(SessionError::Connect(e));
            }
        };

        self.emit(StatusLevel::Info, "connection established".to_string());
        self.send_note(format!("Watch started: {}", self.plan.route_label()))
            .await;

        let scanner = Scanner::new(Arc::clone(&session));
        match self.strategy {
            PollStrategy::Rescan => self.run_rescan(&scanner, &session).await,
            PollStrategy::RoundRobin => self.run_round_robin(&scanner, &session).await,
        }
    }

    async fn run_rescan(
        mut self,
        scanner: &Scanner,
        session: &Arc<dyn RailSession>,
    ) -> Result<AcquisitionResult, SessionError> {
        loop {
            self.enter(
                SessionState::Scanning,
                StatusLevel::Info,
                format!("pass #{}: scanning", self.iteration + 1),
            );
            let snapshot = self.scan_until_complete(scanner).await;
            self.iteration += 1;
            self.publish_status();
            self.emit(
                StatusLevel::Info,
                format!(
                    "scanned {} offerings, {} available",
                    snapshot.offerings.len(),
                    snapshot.available_count()
                ),
            );

            match first_available(&snapshot) {
                Some(target) => {
                    self.enter(
                        SessionState::Claiming,
                        StatusLevel::Info,
                        format!("target detected [{}], claiming", target.id),
                    );
                    match session.claim(target, self.plan.preference).await {
                        Ok(result) => {
                            self.succeed(&result).await;
                            return Ok(result);
                        }
                        Err(rejection) => {
                            self.emit(
                                StatusLevel::Warning,
                                format!("claim on [{}] rejected: {rejection}", target.id),
                            );
                            self.idle_wait().await;
                        }
                    }
                }
                None => self.idle_wait().await,
            }
        }
    }

    async fn run_round_robin(
        mut self,
        scanner: &Scanner,
        session: &Arc<dyn RailSession>,
    ) -> Result<AcquisitionResult, SessionError> {
        self.enter(
            SessionState::Scanning,
            StatusLevel::Info,
            "taking initial snapshot".to_string(),
        );
        let snapshot = self.scan_until_complete(scanner).await;
        if snapshot.offerings.is_empty() {
            // This mode never re-scans, so nothing could ever become visitable.
            self.enter(
                SessionState::Fatal,
                StatusLevel::Error,
                "initial snapshot is empty, nothing to visit".to_string(),
            );
            return Err(SessionError::EmptyTimetable);
        }
        self.emit(
            StatusLevel::Info,
            format!(
                "snapshot captured: {} offerings, visiting in fixed rotation",
                snapshot.offerings.len()
            ),
        );

        let mut cursor = RoundRobinCursor::new();
        loop {
            self.idle_wait().await;
            // Non-empty checked above, advance always yields.
            let Some(target) = cursor.advance(&snapshot) else {
                unreachable!("round-robin cursor on non-empty snapshot");
            };
            self.iteration += 1;
            self.enter(
                SessionState::Claiming,
                StatusLevel::Info,
                format!("visit #{}: claiming [{}]", self.iteration, target.id),
            );
            match session.claim(target, self.plan.preference).await {
                Ok(result) => {
                    self.succeed(&result).await;
                    return Ok(result);
                }
                Err(rejection) => {
                    self.emit(
                        StatusLevel::Warning,
                        format!("claim on [{}] rejected: {rejection}", target.id),
                    );
                }
            }
        }
    }

    /// Retries a failed scan on the fixed short backoff until one completes.
    /// The state stays Scanning and the iteration counter does not advance.
    async fn scan_until_complete(&mut self, scanner: &Scanner) -> InventorySnapshot {
        loop {
            match scanner.fetch(&self.plan).await {
                Ok(snapshot) => return snapshot,
                Err(e) => {
                    self.emit(
                        StatusLevel::Warning,
                        format!(
                            "scan failed ({e}), retrying in {}s",
                            self.scan_retry.as_secs()
                        ),
                    );
                    sleep(self.scan_retry).await;
                }
            }
        }
    }

    async fn idle_wait(&mut self) {
        let delay = jittered_delay(&self.plan.interval);
        self.enter(
            SessionState::IdleWait,
            StatusLevel::Info,
            format!("idle for {:.1}s", delay.as_secs_f64()),
        );
        sleep(delay).await;
    }

    async fn succeed(&mut self, result: &AcquisitionResult) {
        self.confirmation_code = Some(result.confirmation_code.clone());
        self.enter(
            SessionState::Success,
            StatusLevel::Success,
            format!(
                "target acquired: {} departing {} (confirmation {})",
                result.offering.train_name,
                result.offering.departs_at.format("%H:%M"),
                result.confirmation_code
            ),
        );
        self.send_note(success_note(&result.offering, &result.confirmation_code))
            .await;
    }

    /// Transition to `state`, publish the status snapshot and emit one event.
    fn enter(&mut self, state: SessionState, level: StatusLevel, message: String) {
        self.state = state;
        self.publish_status();
        self.emit(level, message);
    }

    fn publish_status(&self) {
        let _ = self.status.send(SessionStatus {
            state: self.state,
            iteration: self.iteration,
            started_at: self.started_at,
            confirmation_code: self.confirmation_code.clone(),
        });
    }

    fn emit(&self, level: StatusLevel, message: String) {
        // No subscribers is fine, the stream is advisory.
        let _ = self.events.send(StatusEvent::now(level, message));
    }

    /// Best-effort operator notification; failures never reach the loop.
    async fn send_note(&self, text: String) {
        if let Err(e) = self.notifier.notify(&text).await {
            warn!("notification dropped: {e}");
        }
    }
}

fn success_note(offering: &SeatOffering, confirmation_code: &str) -> String {
    format!(
        "Seat claimed! {} departing {} - confirmation {}",
        offering.train_name,
        offering.departs_at.format("%Y-%m-%d %H:%M"),
        confirmation_code
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use talon_core::{
        ClaimRejection, ConnectError, IntervalBounds, ScanError, SeatPreference, StationCode,
    };

    fn plan() -> WatchPlan {
        WatchPlan {
            origin: StationCode::parse("SSR").unwrap(),
            destination: StationCode::parse("BSN").unwrap(),
            travel_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            window_start: "12:00:00".parse().unwrap(),
            window_end: "23:00:00".parse().unwrap(),
            preference: SeatPreference::GeneralFirst,
            interval: IntervalBounds { min_secs: 3, max_secs: 6 },
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("member-1", "secret")
    }

    fn offering(id: &str, departs: &str, available: bool) -> SeatOffering {
        SeatOffering {
            id: id.to_string(),
            train_name: format!("Express {id}"),
            departs_at: format!("2026-09-01T{departs}:00").parse().unwrap(),
            arrives_at: "2026-09-01T23:59:00".parse().unwrap(),
            available,
            fare_amount: 52300,
            fare_currency: "KRW".into(),
        }
    }

    /// Carrier session that replays scripted scan and claim outcomes.
    struct ScriptedSession {
        scans: Mutex<VecDeque<Result<Vec<SeatOffering>, ScanError>>>,
        claims: Mutex<VecDeque<Result<String, ClaimRejection>>>,
        visited: Mutex<Vec<String>>,
    }

    impl ScriptedSession {
        fn new(
            scans: Vec<Result<Vec<SeatOffering>, ScanError>>,
            claims: Vec<Result<String, ClaimRejection>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                scans: Mutex::new(scans.into()),
                claims: Mutex::new(claims.into()),
                visited: Mutex::new(Vec::new()),
            })
        }

        fn remaining(&self) -> (usize, usize) {
            (
                self.scans.lock().unwrap().len(),
                self.claims.lock().unwrap().len(),
            )
        }

        fn visited(&self) -> Vec<String> {
            self.visited.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RailSession for ScriptedSession {
        async fn scan(&self, _plan: &WatchPlan) -> Result<Vec<SeatOffering>, ScanError> {
            self.scans
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ScanError("script exhausted".into())))
        }

        async fn claim(
            &self,
            offering: &SeatOffering,
            _preference: SeatPreference,
        ) -> Result<AcquisitionResult, ClaimRejection> {
            self.visited.lock().unwrap().push(offering.id.clone());
            let outcome = self
                .claims
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ClaimRejection::SoldOut));
            outcome.map(|confirmation_code| AcquisitionResult {
                confirmation_code,
                offering: offering.clone(),
                claimed_at: Utc::now(),
            })
        }
    }

    struct ScriptedConnector {
        session: Arc<ScriptedSession>,
        fail_with: Option<fn() -> ConnectError>,
    }

    #[async_trait]
    impl RailConnector for ScriptedConnector {
        async fn connect(
            &self,
            _credentials: &Credentials,
        ) -> Result<Arc<dyn RailSession>, ConnectError> {
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(Arc::clone(&self.session) as Arc<dyn RailSession>),
            }
        }
    }

    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self { messages: Mutex::new(Vec::new()) })
        }

        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) -> Result<(), talon_core::NotifyError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn build(
        backend: Arc<ScriptedSession>,
        notifier: Arc<RecordingNotifier>,
        strategy: PollStrategy,
    ) -> PollSession {
        let connector = Arc::new(ScriptedConnector { session: backend, fail_with: None });
        PollSession::new(
            plan(),
            credentials(),
            strategy,
            Duration::from_secs(3),
            connector,
            notifier,
        )
        .unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<StatusEvent>) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_reaches_success_with_one_notification() {
        let backend = ScriptedSession::new(
            vec![Ok(vec![offering("101", "13:00", false), offering("102", "14:00", true)])],
            vec![Ok("ABC123".to_string())],
        );
        let notifier = RecordingNotifier::new();
        let session = build(Arc::clone(&backend), Arc::clone(&notifier), PollStrategy::Rescan);
        let status_rx = session.status_receiver();

        let result = session.run().await.unwrap();

        assert_eq!(result.confirmation_code, "ABC123");
        assert_eq!(result.offering.id, "102");

        let status = status_rx.borrow().clone();
        assert_eq!(status.state, SessionState::Success);
        assert_eq!(status.iteration, 1);
        assert_eq!(status.confirmation_code.as_deref(), Some("ABC123"));

        // No further scan or claim after success.
        assert_eq!(backend.remaining(), (0, 0));
        assert_eq!(backend.visited(), vec!["102"]);

        // Start note plus exactly one success notification.
        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        let success_msgs: Vec<_> = messages.iter().filter(|m| m.contains("ABC123")).collect();
        assert_eq!(success_msgs.len(), 1);
    }

    struct FailingNotifier {
        attempts: Mutex<u32>,
    }

    impl FailingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self { attempts: Mutex::new(0) })
        }

        fn attempts(&self) -> u32 {
            *self.attempts.lock().unwrap()
        }
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _text: &str) -> Result<(), talon_core::NotifyError> {
            *self.attempts.lock().unwrap() += 1;
            Err(talon_core::NotifyError("bot unreachable".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_failures_never_affect_the_loop() {
        let backend = ScriptedSession::new(
            vec![Ok(vec![offering("102", "14:00", true)])],
            vec![Ok("ABC123".to_string())],
        );
        let notifier = FailingNotifier::new();
        let connector = Arc::new(ScriptedConnector {
            session: Arc::clone(&backend),
            fail_with: None,
        });
        let session = PollSession::new(
            plan(),
            credentials(),
            PollStrategy::Rescan,
            Duration::from_secs(3),
            connector,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        )
        .unwrap();
        let status_rx = session.status_receiver();

        // Every delivery fails; the session must still claim and finish.
        let result = session.run().await.unwrap();

        assert_eq!(result.confirmation_code, "ABC123");
        assert_eq!(status_rx.borrow().state, SessionState::Success);
        // Start note and success note were both attempted and both dropped.
        assert_eq!(notifier.attempts(), 2);
        assert_eq!(backend.remaining(), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_errors_retry_without_advancing_iteration() {
        let backend = ScriptedSession::new(
            vec![
                Err(ScanError("timeout".into())),
                Err(ScanError("timeout".into())),
                Ok(vec![offering("102", "14:00", true)]),
            ],
            vec![Ok("RTY777".to_string())],
        );
        let notifier = RecordingNotifier::new();
        let session = build(Arc::clone(&backend), notifier, PollStrategy::Rescan);
        let status_rx = session.status_receiver();
        let mut events_rx = session.event_sender().subscribe();

        let result = session.run().await.unwrap();
        assert_eq!(result.confirmation_code, "RTY777");

        let retries = drain(&mut events_rx)
            .iter()
            .filter(|e| e.message.contains("retrying"))
            .count();
        assert_eq!(retries, 2);

        // Two failed scans never counted as passes.
        assert_eq!(status_rx.borrow().iteration, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_rejection_returns_to_polling() {
        let backend = ScriptedSession::new(
            vec![
                Ok(vec![offering("102", "14:00", true)]),
                Ok(vec![offering("102", "14:00", true)]),
            ],
            vec![Err(ClaimRejection::SoldOut), Ok("SEC0ND".to_string())],
        );
        let notifier = RecordingNotifier::new();
        let session = build(Arc::clone(&backend), notifier, PollStrategy::Rescan);
        let status_rx = session.status_receiver();

        let result = session.run().await.unwrap();

        assert_eq!(result.confirmation_code, "SEC0ND");
        // Rejected offering was reselected on the next pass, no blacklist.
        assert_eq!(backend.visited(), vec!["102", "102"]);
        assert_eq!(status_rx.borrow().iteration, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_target_waits_then_rescans() {
        let backend = ScriptedSession::new(
            vec![
                Ok(vec![offering("101", "13:00", false)]),
                Ok(vec![offering("101", "13:00", true)]),
            ],
            vec![Ok("W8TED1".to_string())],
        );
        let notifier = RecordingNotifier::new();
        let session = build(Arc::clone(&backend), notifier, PollStrategy::Rescan);
        let mut events_rx = session.event_sender().subscribe();

        session.run().await.unwrap();

        let idles = drain(&mut events_rx)
            .iter()
            .filter(|e| e.message.starts_with("idle for"))
            .count();
        assert_eq!(idles, 1);
    }

    #[tokio::test]
    async fn test_incomplete_credentials_rejected_before_any_state() {
        let backend = ScriptedSession::new(vec![], vec![]);
        let connector = Arc::new(ScriptedConnector { session: backend, fail_with: None });
        let err = match PollSession::new(
            plan(),
            Credentials::new("", ""),
            PollStrategy::Rescan,
            Duration::from_secs(3),
            connector,
            RecordingNotifier::new(),
        ) {
            Ok(_) => panic!("blank credentials accepted"),
            Err(e) => e,
        };
        assert!(matches!(err, ConfigError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal_and_silent() {
        let backend = ScriptedSession::new(vec![], vec![]);
        let connector = Arc::new(ScriptedConnector {
            session: Arc::clone(&backend),
            fail_with: Some(|| ConnectError::Auth("bad password".into())),
        });
        let notifier = RecordingNotifier::new();
        let session = PollSession::new(
            plan(),
            credentials(),
            PollStrategy::Rescan,
            Duration::from_secs(3),
            connector,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        )
        .unwrap();
        let status_rx = session.status_receiver();

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, SessionError::Connect(ConnectError::Auth(_))));
        assert_eq!(status_rx.borrow().state, SessionState::Fatal);
        assert_eq!(backend.remaining(), (0, 0));
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_visits_in_rotation_ignoring_flags() {
        let backend = ScriptedSession::new(
            vec![Ok(vec![offering("101", "13:00", false), offering("102", "14:00", false)])],
            vec![
                Err(ClaimRejection::SoldOut),
                Err(ClaimRejection::SoldOut),
                Ok("R0B1N1".to_string()),
            ],
        );
        let notifier = RecordingNotifier::new();
        let session = build(Arc::clone(&backend), notifier, PollStrategy::RoundRobin);
        let status_rx = session.status_receiver();

        let result = session.run().await.unwrap();

        assert_eq!(result.confirmation_code, "R0B1N1");
        // One initial scan only, then cyclic visits with wrap-around.
        assert_eq!(backend.remaining(), (0, 0));
        assert_eq!(backend.visited(), vec!["101", "102", "101"]);
        assert_eq!(status_rx.borrow().iteration, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_empty_snapshot_is_fatal() {
        let backend = ScriptedSession::new(vec![Ok(vec![])], vec![]);
        let notifier = RecordingNotifier::new();
        let session = build(backend, notifier, PollStrategy::RoundRobin);
        let status_rx = session.status_receiver();

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, SessionError::EmptyTimetable));
        assert_eq!(status_rx.borrow().state, SessionState::Fatal);
    }
}
