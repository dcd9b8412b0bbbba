pub mod events;
pub mod masked;

pub use events::{StatusEvent, StatusLevel};
pub use masked::Masked;
