pub mod app_config;
pub mod notify;
pub mod sim_rail;

pub use app_config::Config;
pub use notify::{NullNotifier, TelegramNotifier};
pub use sim_rail::SimRailConnector;
