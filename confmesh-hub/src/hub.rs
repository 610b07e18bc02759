use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use confmesh_signaling::{ChannelEvent, Error, Frame, Member, Whisper};
use tokio::sync::{RwLock, mpsc};

use crate::HubConnection;

#[derive(Debug, Clone)]
struct Subscriber {
    connection_id: u64,
    member: Member,
    frame_tx: mpsc::UnboundedSender<String>,
}

/// In-process presence service.
///
/// Implements the subset of presence-channel semantics the call core
/// relies on: a roster snapshot on join, member added/removed
/// notifications, and client events fanned out to every other subscriber.
/// A member connected more than once is announced once and removed once.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
pub(crate) struct HubInner {
    channels: RwLock<HashMap<String, Vec<Subscriber>>>,
    connection_counter: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new client connection to this hub.
    pub fn connect(&self) -> HubConnection {
        let connection_id = self.inner.connection_counter.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(connection_id, "Client connected");
        HubConnection::new(self.inner.clone(), connection_id)
    }

    /// Distinct members currently subscribed to `channel`, in join order.
    pub async fn members(&self, channel: &str) -> Vec<Member> {
        let channels = self.inner.channels.read().await;
        let mut members: Vec<Member> = Vec::new();
        if let Some(subscribers) = channels.get(channel) {
            for subscriber in subscribers {
                if !members.iter().any(|m| m.id == subscriber.member.id) {
                    members.push(subscriber.member.clone());
                }
            }
        }
        members
    }

    pub async fn channel_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }

    /// Push an error event to every subscriber of `channel`.
    pub async fn broadcast_error(&self, channel: &str, message: &str) -> Result<(), Error> {
        let mut channels = self.inner.channels.write().await;
        let Some(subscribers) = channels.get_mut(channel) else {
            return Err(format!("Channel {channel} does not exist").into());
        };
        let frame = encode(channel, &ChannelEvent::Error(message.to_string()))?;
        for subscriber in subscribers.iter() {
            let _ = subscriber.frame_tx.send(frame.clone());
        }
        Ok(())
    }
}

impl HubInner {
    pub(crate) async fn subscribe(
        &self,
        connection_id: u64,
        channel: &str,
        member: Member,
        frame_tx: mpsc::UnboundedSender<String>,
    ) -> Result<(), Error> {
        let mut channels = self.channels.write().await;
        let subscribers = channels.entry(channel.to_string()).or_default();
        if subscribers
            .iter()
            .any(|s| s.connection_id == connection_id)
        {
            return Err(format!("Connection already subscribed to {channel}").into());
        }
        let already_present = subscribers.iter().any(|s| s.member.id == member.id);
        subscribers.push(Subscriber {
            connection_id,
            member: member.clone(),
            frame_tx: frame_tx.clone(),
        });
        let mut roster: Vec<Member> = Vec::new();
        for subscriber in subscribers.iter() {
            if !roster.iter().any(|m| m.id == subscriber.member.id) {
                roster.push(subscriber.member.clone());
            }
        }
        tracing::info!(
            connection_id,
            %channel,
            member_id = %member.id,
            members = roster.len(),
            "Member subscribed"
        );
        frame_tx
            .send(encode(channel, &ChannelEvent::Here(roster))?)
            .map_err(|_| "Subscriber dropped before roster delivery")?;
        if !already_present {
            let frame = encode(channel, &ChannelEvent::Joining(member.clone()))?;
            for subscriber in subscribers.iter() {
                if subscriber.member.id != member.id {
                    let _ = subscriber.frame_tx.send(frame.clone());
                }
            }
        }
        let removed = prune_closed(subscribers);
        self.announce_removed(channel, subscribers, removed)?;
        Ok(())
    }

    pub(crate) async fn unsubscribe(&self, connection_id: u64, channel: &str) -> Result<(), Error> {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(channel) else {
            return Err(format!("Not subscribed to {channel}").into());
        };
        let Some(index) = subscribers
            .iter()
            .position(|s| s.connection_id == connection_id)
        else {
            return Err(format!("Not subscribed to {channel}").into());
        };
        let subscriber = subscribers.remove(index);
        tracing::info!(
            connection_id,
            %channel,
            member_id = %subscriber.member.id,
            "Member unsubscribed"
        );
        let mut removed = vec![subscriber.member];
        removed.extend(prune_closed(subscribers));
        self.announce_removed(channel, subscribers, removed)?;
        if subscribers.is_empty() {
            channels.remove(channel);
            tracing::debug!(%channel, "Channel vacated");
        }
        Ok(())
    }

    pub(crate) async fn relay(
        &self,
        connection_id: u64,
        channel: &str,
        whisper: Whisper,
    ) -> Result<(), Error> {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(channel) else {
            return Err(format!("Not subscribed to {channel}").into());
        };
        if !subscribers.iter().any(|s| s.connection_id == connection_id) {
            return Err(format!("Not subscribed to {channel}").into());
        }
        tracing::trace!(
            connection_id,
            %channel,
            kind = whisper.kind().as_str(),
            sender = %whisper.sender_id,
            recipient = %whisper.recipient_id,
            "Relaying client event"
        );
        let frame = encode(channel, &ChannelEvent::Whisper(whisper))?;
        for subscriber in subscribers.iter() {
            if subscriber.connection_id != connection_id {
                let _ = subscriber.frame_tx.send(frame.clone());
            }
        }
        let removed = prune_closed(subscribers);
        self.announce_removed(channel, subscribers, removed)?;
        Ok(())
    }

    /// Tell the remaining subscribers about members with no connection left.
    fn announce_removed(
        &self,
        channel: &str,
        subscribers: &[Subscriber],
        removed: Vec<Member>,
    ) -> Result<(), Error> {
        for member in removed {
            if subscribers.iter().any(|s| s.member.id == member.id) {
                continue;
            }
            let frame = encode(channel, &ChannelEvent::Leaving(member))?;
            for subscriber in subscribers {
                let _ = subscriber.frame_tx.send(frame.clone());
            }
        }
        Ok(())
    }
}

fn encode(channel: &str, event: &ChannelEvent) -> Result<String, Error> {
    Frame::from_event(channel, event)?.serialize()
}

/// Drop subscribers whose connection went away without leaving.
fn prune_closed(subscribers: &mut Vec<Subscriber>) -> Vec<Member> {
    let mut removed = Vec::new();
    subscribers.retain(|subscriber| {
        let keep = !subscriber.frame_tx.is_closed();
        if !keep {
            tracing::info!(
                connection_id = subscriber.connection_id,
                member_id = %subscriber.member.id,
                "Removing closed subscriber"
            );
            removed.push(subscriber.member.clone());
        }
        keep
    });
    removed
}
