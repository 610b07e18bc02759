use crate::{Member, Whisper};

/// Everything a subscriber of a presence channel can observe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Full roster, delivered once right after joining. Includes self.
    Here(Vec<Member>),
    Joining(Member),
    Leaving(Member),
    Whisper(Whisper),
    Error(String),
}

impl ChannelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Here(_) => "here",
            Self::Joining(_) => "joining",
            Self::Leaving(_) => "leaving",
            Self::Whisper(_) => "whisper",
            Self::Error(_) => "error",
        }
    }
}
