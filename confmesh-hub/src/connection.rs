use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use confmesh_signaling::{ChannelEvent, Error, Frame, Member, PresenceChannel, Whisper};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::hub::HubInner;

/// One client connection to a [`crate::Hub`].
///
/// Every joined channel gets a reader task that decodes wire frames and
/// forwards them as [`ChannelEvent`]s.
pub struct HubConnection {
    hub: Arc<HubInner>,
    connection_id: u64,
    readers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl HubConnection {
    const MAX_EVENTS: usize = 64;

    pub(crate) fn new(hub: Arc<HubInner>, connection_id: u64) -> Self {
        Self {
            hub,
            connection_id,
            readers: Mutex::new(HashMap::new()),
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn joined_channels(&self) -> Vec<String> {
        let readers = self.readers.lock();
        readers.keys().cloned().collect()
    }

    async fn read_frames(
        channel: String,
        mut frame_rx: mpsc::UnboundedReceiver<String>,
        event_tx: mpsc::Sender<ChannelEvent>,
    ) {
        while let Some(text) = frame_rx.recv().await {
            let event = match Frame::deserialize(&text).and_then(Frame::into_event) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(%channel, ?err, "Failed to decode frame");
                    continue;
                }
            };
            if event_tx.send(event).await.is_err() {
                tracing::debug!(%channel, "Event receiver dropped");
                break;
            }
        }
        tracing::debug!(%channel, "Frame reader stopped");
    }
}

#[async_trait]
impl PresenceChannel for HubConnection {
    async fn join(
        &self,
        channel: &str,
        member: Member,
    ) -> Result<mpsc::Receiver<ChannelEvent>, Error> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(Self::MAX_EVENTS);
        self.hub
            .subscribe(self.connection_id, channel, member, frame_tx)
            .await?;
        let reader = tokio::spawn(Self::read_frames(channel.to_string(), frame_rx, event_tx));
        let mut readers = self.readers.lock();
        if let Some(previous) = readers.insert(channel.to_string(), reader) {
            previous.abort();
        }
        Ok(event_rx)
    }

    async fn whisper(&self, channel: &str, whisper: Whisper) -> Result<(), Error> {
        self.hub.relay(self.connection_id, channel, whisper).await
    }

    async fn leave(&self, channel: &str) -> Result<(), Error> {
        let reader = self.readers.lock().remove(channel);
        if let Some(reader) = reader {
            reader.abort();
        }
        self.hub.unsubscribe(self.connection_id, channel).await
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        for (_, reader) in self.readers.get_mut().drain() {
            reader.abort();
        }
    }
}
