use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::model::BroadcastEnvelope;

use super::{decode, encode, topic, Broadcaster, Frame, Subscription};

const CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frames published by an instance are not delivered back to it.
    Others,
    Everyone,
}

/// In-process origin: every channel opened from one hub (or a clone of it)
/// with the same name shares a topic.
#[derive(Clone, Default)]
pub struct LocalHub {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Frame>>>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, name: &str) -> broadcast::Sender<Frame> {
        self.topics
            .lock()
            .entry(topic(name))
            .or_insert_with(|| broadcast::channel(CAPACITY).0)
            .clone()
    }

    pub fn channel(&self, name: &str, delivery: Delivery) -> LocalChannel {
        LocalChannel {
            name: name.to_string(),
            sender: self.sender(name),
            origin: Uuid::new_v4(),
            delivery,
        }
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.topics.lock().get(&topic(name)).map_or(0, |s| s.receiver_count())
    }
}

#[derive(Clone)]
pub struct LocalChannel {
    name: String,
    sender: broadcast::Sender<Frame>,
    origin: Uuid,
    delivery: Delivery,
}

impl LocalChannel {
    pub fn origin(&self) -> Uuid {
        self.origin
    }
}

impl Broadcaster for LocalChannel {
    fn channel_name(&self) -> &str {
        &self.name
    }

    fn publish(&self, envelope: &BroadcastEnvelope) {
        let Some(payload) = encode(envelope) else { return };
        // No receivers is fine: nobody else is listening yet.
        let _ = self.sender.send(Frame { origin: self.origin, payload });
    }

    fn subscribe(&self) -> Subscription {
        let rx = self.sender.subscribe();
        let origin = self.origin;
        let skip_own = self.delivery == Delivery::Others;
        stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => {
                        if skip_own && frame.origin == origin {
                            continue;
                        }
                        if let Some(envelope) = decode(&frame.payload) {
                            return Some((envelope, rx));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "broadcast subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
