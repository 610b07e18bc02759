mod handle;
mod listener;
mod manager;

pub use handle::{CallSession, SessionStatus, SessionView};
pub use listener::{SessionListener, StubListener};
pub use manager::{CallEnvironment, CallSessionController};
