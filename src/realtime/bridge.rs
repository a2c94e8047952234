use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use super::Broadcaster;

/// Relays envelopes in both directions between two channels, typically a hub
/// channel and a Redis channel. Both sides must skip their own frames or the
/// bridge would echo forever.
pub fn spawn_bridge(local: Arc<dyn Broadcaster>, remote: Arc<dyn Broadcaster>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut from_local = local.subscribe();
        let mut from_remote = remote.subscribe();
        tracing::info!(channel = local.channel_name(), "bridge started");
        loop {
            tokio::select! {
                Some(envelope) = from_local.next() => remote.publish(&envelope),
                Some(envelope) = from_remote.next() => local.publish(&envelope),
                else => break,
            }
        }
        tracing::warn!(channel = local.channel_name(), "bridge stopped");
    })
}
