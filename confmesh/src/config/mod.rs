use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// One ICE server entry. TURN credentials go through `username` and
/// `credential`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Configuration handed to every new peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub ice_candidate_pool_size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Call settings. Every field has a default, so a partial JSON document
/// (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub ice_servers: Vec<IceServer>,
    pub ice_candidate_pool_size: u8,
    pub media: MediaConstraints,
    pub recorder_timeslice_ms: u64,
    pub recording_mime_preferences: Vec<String>,
    pub cleanup_cooldown_ms: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServer::stun("stun:stun.l.google.com:19302"),
                IceServer::stun("stun:stun1.l.google.com:19302"),
            ],
            ice_candidate_pool_size: 10,
            media: MediaConstraints::default(),
            recorder_timeslice_ms: 1000,
            recording_mime_preferences: vec![
                "audio/webm;codecs=opus".to_string(),
                "audio/webm".to_string(),
                "audio/ogg;codecs=opus".to_string(),
                "audio/ogg".to_string(),
            ],
            cleanup_cooldown_ms: 500,
        }
    }
}

impl CallConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, anyhow::Error> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| anyhow!("Failed to parse call config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read call config {}: {}", path.display(), e))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.recorder_timeslice_ms == 0 {
            return Err(anyhow!("recorder_timeslice_ms must be positive"));
        }
        if let Some(server) = self.ice_servers.iter().find(|s| s.urls.is_empty()) {
            return Err(anyhow!("ICE server entry without urls: {:?}", server));
        }
        Ok(())
    }

    pub fn rtc_configuration(&self) -> RtcConfiguration {
        RtcConfiguration {
            ice_servers: self.ice_servers.clone(),
            ice_candidate_pool_size: self.ice_candidate_pool_size,
        }
    }

    pub fn recorder_timeslice(&self) -> Duration {
        Duration::from_millis(self.recorder_timeslice_ms)
    }

    pub fn cleanup_cooldown(&self) -> Duration {
        Duration::from_millis(self.cleanup_cooldown_ms)
    }
}
