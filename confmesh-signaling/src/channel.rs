use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{ChannelEvent, Error, Member, Whisper};

/// Client side of a presence/broadcast service.
///
/// Implementations deliver membership events and whispers for a joined
/// channel through the returned receiver, in the order the service emitted
/// them. The receiver closes when the channel is left or the connection is
/// lost.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    async fn join(
        &self,
        channel: &str,
        member: Member,
    ) -> Result<mpsc::Receiver<ChannelEvent>, Error>;

    async fn whisper(&self, channel: &str, whisper: Whisper) -> Result<(), Error>;

    async fn leave(&self, channel: &str) -> Result<(), Error>;
}
