use serde::{Deserialize, Deserializer, Serialize};

/// Prefix of every meeting presence channel.
pub const MEETING_CHANNEL_PREFIX: &str = "presence-meeting.";

/// Derives the presence channel name for a meeting.
pub fn channel_name(meeting_id: &str) -> String {
    format!("{MEETING_CHANNEL_PREFIX}{meeting_id}")
}

/// A presence channel member.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Name to show for this member, falling back to a short form of the id.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            fallback_name(&self.id)
        } else {
            self.name.clone()
        }
    }
}

/// `User abcd` style placeholder used when a peer shows up without a name.
pub fn fallback_name(id: &str) -> String {
    let short: String = id.chars().take(4).collect();
    format!("User {short}")
}

/// Backends disagree on whether user ids are numbers or strings.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(v) => v,
        RawId::Number(v) => v.to_string(),
    })
}
