pub mod handle;
pub mod session;

pub use handle::{spawn, SessionHandle};
pub use session::{PollSession, PollStrategy, SessionState, SessionStatus};
