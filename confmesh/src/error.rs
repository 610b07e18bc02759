use thiserror::Error;

/// Local capture failure, carrying the platform error name
/// (`NotAllowedError`, `NotFoundError`, ...) and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct MediaAccessError {
    pub name: String,
    pub message: String,
}

impl MediaAccessError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new("NotAllowedError", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFoundError", message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("Invalid call configuration: {0}")]
    Config(String),
    #[error("A call session is already active")]
    AlreadyActive,
    #[error("Media device error: {0}")]
    MediaAccess(#[from] MediaAccessError),
    #[error("Could not join the meeting channel: {0}")]
    ChannelJoin(String),
    #[error("Meeting channel error: {0}")]
    Channel(String),
    #[error("Negotiation with {participant_id} failed: {message}")]
    Negotiation {
        participant_id: String,
        message: String,
    },
    #[error("Audio recording error: {0}")]
    Recording(String),
}

impl CallError {
    pub(crate) fn negotiation(participant_id: &str, err: impl std::fmt::Display) -> Self {
        Self::Negotiation {
            participant_id: participant_id.to_string(),
            message: err.to_string(),
        }
    }

    /// Short error kind, as shown in the call view.
    pub fn name(&self) -> &str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::AlreadyActive => "AlreadyActive",
            Self::MediaAccess(err) => &err.name,
            Self::ChannelJoin(_) => "ChannelJoinError",
            Self::Channel(_) => "ChannelError",
            Self::Negotiation { .. } => "NegotiationError",
            Self::Recording(_) => "RecordingError",
        }
    }

    /// Whether the error ends the session start sequence.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MediaAccess(_) | Self::ChannelJoin(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names() {
        let err = CallError::from(MediaAccessError::not_allowed("Permission denied"));
        assert_eq!(err.name(), "NotAllowedError");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Media device error: NotAllowedError: Permission denied"
        );

        let err = CallError::negotiation("42", "bad sdp");
        assert_eq!(err.name(), "NegotiationError");
        assert!(!err.is_fatal());
        assert!(!CallError::Channel("lost".to_string()).is_fatal());
    }
}
