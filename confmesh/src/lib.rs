pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod recorder;
pub mod session;
pub mod signaling;

pub use error::{CallError, MediaAccessError};
pub use session::{CallEnvironment, CallSessionController, SessionStatus};
