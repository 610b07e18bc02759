mod channel;
mod description;
mod event;
mod frame;
mod member;
mod whisper;

pub use channel::*;
pub use description::*;
pub use event::*;
pub use frame::*;
pub use member::*;
pub use whisper::*;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
