use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use talon_api::{app, AppState, WatchDefaults, WatchRegistry};
use talon_core::{Credentials, IntervalBounds, Notifier, RailConnector};
use talon_store::{NullNotifier, SimRailConnector, TelegramNotifier};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "talon_api=debug,talon_session=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = talon_store::Config::load().expect("Failed to load config");
    tracing::info!("Starting Talon API on port {}", config.server.port);

    let connector: Arc<dyn RailConnector> = match config.rail.backend.as_str() {
        "simulated" => Arc::new(SimRailConnector::new(config.sim.clone())),
        other => panic!("Unknown rail backend: {other}"),
    };

    let notifier: Arc<dyn Notifier> = match (&config.telegram.bot_token, &config.telegram.chat_id)
    {
        (Some(token), Some(chat_id)) => {
            tracing::info!("Telegram notifications enabled");
            Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone()))
        }
        _ => {
            tracing::warn!("Telegram not configured, notifications disabled");
            Arc::new(NullNotifier)
        }
    };

    let app_state = AppState {
        connector,
        notifier,
        defaults: WatchDefaults {
            interval: IntervalBounds {
                min_secs: config.watch.interval_min_secs,
                max_secs: config.watch.interval_max_secs,
            },
            scan_retry: Duration::from_secs(config.watch.scan_retry_secs),
            credentials: Credentials::new(
                config.rail.member_id.clone(),
                config.rail.password.clone(),
            ),
        },
        watches: Arc::new(WatchRegistry::new()),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
