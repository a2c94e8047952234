use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::BroadcastEnvelope;

pub mod bridge;
pub mod notifier;
pub mod redis_channel;
pub mod ws;

pub use notifier::{Delivery, LocalChannel, LocalHub};

pub const DEFAULT_CHANNEL_NAME: &str = "token-form-notification";

pub type Subscription = BoxStream<'static, BroadcastEnvelope>;

// Instances opened with the same name exchange envelopes, best-effort. A frame
// published before an instance subscribed is never seen by it.
pub trait Broadcaster: Send + Sync {
    fn channel_name(&self) -> &str;
    /// Fire-and-forget. Never blocks and never fails the caller.
    fn publish(&self, envelope: &BroadcastEnvelope);
    fn subscribe(&self) -> Subscription;
}

/// Stand-in used when no broadcast primitive is available: nothing is sent
/// and nothing arrives.
#[derive(Debug, Clone)]
pub struct Unsupported {
    name: String,
}

impl Unsupported {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Broadcaster for Unsupported {
    fn channel_name(&self) -> &str {
        &self.name
    }

    fn publish(&self, envelope: &BroadcastEnvelope) {
        tracing::trace!(id = envelope.id(), "broadcast unsupported, dropping envelope");
    }

    fn subscribe(&self) -> Subscription {
        stream::empty().boxed()
    }
}

/// Wire unit shared by every transport: the publishing instance plus the
/// serialized envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Uuid,
    pub payload: String,
}

pub fn topic(name: &str) -> String {
    format!("{name}-channel")
}

pub(crate) fn encode(envelope: &BroadcastEnvelope) -> Option<String> {
    match envelope.to_json() {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(error = %e, id = envelope.id(), "failed to encode envelope");
            None
        }
    }
}

pub(crate) fn decode(payload: &str) -> Option<BroadcastEnvelope> {
    match BroadcastEnvelope::from_json(payload) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable broadcast message");
            None
        }
    }
}
