use futures::stream::{self, StreamExt};
use redis::{AsyncCommands, Client};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::model::BroadcastEnvelope;

use super::{decode, encode, topic, Broadcaster, Frame, Subscription};

/// Channel backed by Redis PUBLISH/SUBSCRIBE, for tabs (or relays) that do not
/// share a process. Frames published by this instance are never delivered
/// back to it.
pub struct RedisChannel {
    name: String,
    client: Client,
    origin: Uuid,
    outbox: mpsc::UnboundedSender<String>,
}

impl RedisChannel {
    /// Must be called inside a tokio runtime: the publisher runs as a task.
    pub fn open(client: Client, name: &str) -> Self {
        let (outbox, rx) = mpsc::unbounded_channel();
        let publisher = client.clone();
        let channel_topic = topic(name);
        tokio::spawn(async move {
            if let Err(e) = run_publisher(publisher, channel_topic, rx).await {
                tracing::error!(error = %e, "redis publisher stopped");
            }
        });
        Self { name: name.to_string(), client, origin: Uuid::new_v4(), outbox }
    }
}

impl Broadcaster for RedisChannel {
    fn channel_name(&self) -> &str {
        &self.name
    }

    fn publish(&self, envelope: &BroadcastEnvelope) {
        let Some(payload) = encode(envelope) else { return };
        let frame = Frame { origin: self.origin, payload };
        match serde_json::to_string(&frame) {
            Ok(raw) => {
                if self.outbox.send(raw).is_err() {
                    tracing::warn!(id = envelope.id(), "redis publisher is gone, dropping envelope");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode frame"),
        }
    }

    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let channel_topic = topic(&self.name);
        let origin = self.origin;
        tokio::spawn(async move {
            if let Err(e) = run_subscriber(client, channel_topic, origin, tx).await {
                tracing::error!(error = %e, "redis subscriber stopped");
            }
        });
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|e| (e, rx)) }).boxed()
    }
}

async fn run_publisher(client: Client, topic: String, mut rx: mpsc::UnboundedReceiver<String>) -> anyhow::Result<()> {
    let mut conn = client.get_async_connection().await?;
    while let Some(raw) = rx.recv().await {
        if let Err(e) = conn.publish::<_, _, ()>(&topic, raw).await {
            tracing::warn!(error = %e, topic = %topic, "redis publish failed");
        }
    }
    Ok(())
}

async fn run_subscriber(
    client: Client,
    topic: String,
    origin: Uuid,
    tx: mpsc::UnboundedSender<BroadcastEnvelope>,
) -> anyhow::Result<()> {
    let mut pubsub = client.get_async_connection().await?.into_pubsub();
    pubsub.subscribe(&topic).await?;
    tracing::info!(topic = %topic, "subscribed to redis channel");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let raw: String = msg.get_payload()?;
        let frame: Frame = match serde_json::from_str(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed redis frame");
                continue;
            }
        };
        if frame.origin == origin {
            continue;
        }
        let Some(envelope) = decode(&frame.payload) else { continue };
        if tx.send(envelope).is_err() {
            break;
        }
    }
    Ok(())
}
