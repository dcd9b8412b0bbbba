pub mod interval;
pub mod scanner;
pub mod selector;

pub use interval::{jittered_delay, jittered_delay_with};
pub use scanner::Scanner;
pub use selector::{first_available, RoundRobinCursor};
