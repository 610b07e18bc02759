use serde::{Deserialize, Serialize};

use crate::{IceCandidate, SessionDescription};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WhisperKind {
    Offer,
    Answer,
    Candidate,
}

impl WhisperKind {
    pub const ALL: [WhisperKind; 3] = [Self::Offer, Self::Answer, Self::Candidate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
        }
    }

    /// Client event name used on the wire, e.g. `client-offer`.
    pub fn event_name(&self) -> String {
        format!("{}{}", crate::Frame::CLIENT_EVENT_PREFIX, self.as_str())
    }

    pub fn from_event_name(event: &str) -> Option<Self> {
        let name = event.strip_prefix(crate::Frame::CLIENT_EVENT_PREFIX)?;
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhisperPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

/// Point-to-point message relayed through the presence channel.
///
/// The presence service fans whispers out to every other member of the
/// channel, so receivers must check `recipient_id` themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Whisper {
    #[serde(deserialize_with = "crate::member::deserialize_id")]
    pub sender_id: String,
    #[serde(deserialize_with = "crate::member::deserialize_id")]
    pub recipient_id: String,
    #[serde(flatten)]
    pub payload: WhisperPayload,
}

impl Whisper {
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        payload: WhisperPayload,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            payload,
        }
    }

    pub fn kind(&self) -> WhisperKind {
        match self.payload {
            WhisperPayload::Offer(_) => WhisperKind::Offer,
            WhisperPayload::Answer(_) => WhisperKind::Answer,
            WhisperPayload::Candidate(_) => WhisperKind::Candidate,
        }
    }

    pub fn is_addressed_to(&self, participant_id: &str) -> bool {
        self.recipient_id == participant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(WhisperKind::Offer.event_name(), "client-offer");
        assert_eq!(
            WhisperKind::from_event_name("client-candidate"),
            Some(WhisperKind::Candidate)
        );
        assert_eq!(WhisperKind::from_event_name("client-typing"), None);
        assert_eq!(WhisperKind::from_event_name("offer"), None);
    }

    #[test]
    fn test_whisper_json_shape() {
        let whisper = Whisper::new(
            "1",
            "2",
            WhisperPayload::Offer(SessionDescription::offer("v=0")),
        );
        let value = serde_json::to_value(&whisper).unwrap();
        assert_eq!(value["senderId"], "1");
        assert_eq!(value["recipientId"], "2");
        assert_eq!(value["offer"]["type"], "offer");
        assert_eq!(value["offer"]["sdp"], "v=0");
    }

    #[test]
    fn test_whisper_from_browser_json() {
        let raw = r#"{
            "senderId": 5,
            "recipientId": "9",
            "candidate": {"candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host", "sdpMid": "0", "sdpMLineIndex": 0}
        }"#;
        let whisper: Whisper = serde_json::from_str(raw).unwrap();
        assert_eq!(whisper.sender_id, "5");
        assert_eq!(whisper.kind(), WhisperKind::Candidate);
        assert!(whisper.is_addressed_to("9"));
        match whisper.payload {
            WhisperPayload::Candidate(c) => {
                assert_eq!(c.sdp_mid.as_deref(), Some("0"));
                assert_eq!(c.sdp_mline_index, Some(0));
            }
            _ => panic!("Expected candidate payload"),
        }
    }
}
