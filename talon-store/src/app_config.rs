use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub rail: RailConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RailConfig {
    /// Which backend to construct. Only "simulated" ships.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Default carrier credentials, normally supplied via
    /// TALON__RAIL__MEMBER_ID / TALON__RAIL__PASSWORD.
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub password: String,
}

/// Missing bot token or chat id means notifications are disabled.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// Jitter bounds applied when a watch request does not carry its own.
    #[serde(default = "default_interval_min")]
    pub interval_min_secs: u64,
    #[serde(default = "default_interval_max")]
    pub interval_max_secs: u64,
    /// Fixed backoff after a transient scan failure.
    #[serde(default = "default_scan_retry")]
    pub scan_retry_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_trains_per_day")]
    pub trains_per_day: u32,
    /// The mid-afternoon train opens up after this many polls.
    #[serde(default = "default_release_after")]
    pub release_after_scans: u64,
    /// Chance per poll that any other train opens up too.
    #[serde(default)]
    pub release_probability: f64,
}

fn default_backend() -> String {
    "simulated".to_string()
}

fn default_interval_min() -> u64 {
    3
}

fn default_interval_max() -> u64 {
    6
}

fn default_scan_retry() -> u64 {
    3
}

fn default_seed() -> u64 {
    42
}

fn default_trains_per_day() -> u32 {
    20
}

fn default_release_after() -> u64 {
    3
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_min_secs: default_interval_min(),
            interval_max_secs: default_interval_max(),
            scan_retry_secs: default_scan_retry(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            trains_per_day: default_trains_per_day(),
            release_after_scans: default_release_after(),
            release_probability: 0.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Environment-specific file, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TALON__SERVER__PORT=9000` sets server.port
            .add_source(config::Environment::with_prefix("TALON").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
