use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{ChannelEvent, Error, Member, Whisper, WhisperKind};

/// JSON envelope exchanged with the presence service.
///
/// Mirrors the Pusher protocol closely enough that the same event names
/// work against a real broadcaster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
    pub const MEMBER_ADDED: &str = "pusher_internal:member_added";
    pub const MEMBER_REMOVED: &str = "pusher_internal:member_removed";
    pub const ERROR: &str = "pusher:error";
    pub const CLIENT_EVENT_PREFIX: &str = "client-";

    pub fn from_event(channel: &str, event: &ChannelEvent) -> Result<Self, Error> {
        let (name, data) = match event {
            ChannelEvent::Here(members) => {
                let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
                let mut hash = Map::new();
                for member in members {
                    hash.insert(member.id.clone(), json!({ "name": member.name }));
                }
                (
                    Self::SUBSCRIPTION_SUCCEEDED.to_string(),
                    json!({ "presence": { "count": members.len(), "ids": ids, "hash": hash } }),
                )
            }
            ChannelEvent::Joining(member) => (
                Self::MEMBER_ADDED.to_string(),
                json!({ "user_id": member.id, "user_info": { "name": member.name } }),
            ),
            ChannelEvent::Leaving(member) => (
                Self::MEMBER_REMOVED.to_string(),
                json!({ "user_id": member.id, "user_info": { "name": member.name } }),
            ),
            ChannelEvent::Whisper(whisper) => {
                (whisper.kind().event_name(), serde_json::to_value(whisper)?)
            }
            ChannelEvent::Error(message) => {
                (Self::ERROR.to_string(), json!({ "message": message }))
            }
        };
        Ok(Self {
            event: name,
            channel: channel.to_string(),
            data,
        })
    }

    pub fn into_event(self) -> Result<ChannelEvent, Error> {
        match self.event.as_str() {
            Self::SUBSCRIPTION_SUCCEEDED => {
                let presence = self
                    .data
                    .get("presence")
                    .ok_or("Missing presence data in subscription frame")?;
                let ids = presence
                    .get("ids")
                    .and_then(Value::as_array)
                    .ok_or("Missing presence ids")?;
                let mut members = Vec::with_capacity(ids.len());
                for id in ids {
                    let id = value_as_id(id).ok_or("Invalid presence id")?;
                    let name = presence
                        .get("hash")
                        .and_then(|h| h.get(&id))
                        .and_then(|info| info.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    members.push(Member { id, name });
                }
                Ok(ChannelEvent::Here(members))
            }
            Self::MEMBER_ADDED => Ok(ChannelEvent::Joining(member_from_data(&self.data)?)),
            Self::MEMBER_REMOVED => Ok(ChannelEvent::Leaving(member_from_data(&self.data)?)),
            Self::ERROR => {
                let message = self
                    .data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown channel error")
                    .to_string();
                Ok(ChannelEvent::Error(message))
            }
            other => {
                if WhisperKind::from_event_name(other).is_none() {
                    tracing::debug!(event = %other, channel = %self.channel, "Rejecting unknown frame");
                    return Err(format!("Unknown event: {other}").into());
                }
                let whisper: Whisper = serde_json::from_value(self.data)?;
                if whisper.kind().event_name() != other {
                    return Err(format!(
                        "Event {other} carries a {} payload",
                        whisper.kind().as_str()
                    )
                    .into());
                }
                Ok(ChannelEvent::Whisper(whisper))
            }
        }
    }

    pub fn serialize(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }
}

fn member_from_data(data: &Value) -> Result<Member, Error> {
    let id = data
        .get("user_id")
        .and_then(value_as_id)
        .ok_or("Missing user_id")?;
    let name = data
        .get("user_info")
        .and_then(|info| info.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Member { id, name })
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(v) => Some(v.clone()),
        Value::Number(v) => Some(v.to_string()),
        _ => None,
    }
}
