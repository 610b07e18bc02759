use async_trait::async_trait;

use crate::config::MediaConstraints;
use crate::error::MediaAccessError;

/// Platform camera/microphone access.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Opens the requested devices. May suspend on a permission prompt.
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<super::MediaStream, MediaAccessError>;
}
