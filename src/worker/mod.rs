use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::db::{offload, DurableStore};
use crate::model::{BroadcastEnvelope, DismissalEvent};
use crate::presenter::{DismissalReports, Presenter};
use crate::realtime::{Broadcaster, Subscription};

pub struct TabWorker {
    /// Records shown from the store at startup.
    pub replayed: usize,
    pub handle: JoinHandle<()>,
}

/// Starts a tab: replays stored notifications into `presenter`, then keeps
/// applying broadcasts and propagating local dismissals.
///
/// The subscription is opened before the store is read, so a record that
/// lands in between is seen at least once. Showing it twice is harmless.
pub fn spawn_tab_worker(
    store: Arc<dyn DurableStore>,
    channel: Arc<dyn Broadcaster>,
    presenter: Arc<dyn Presenter>,
    dismissals: DismissalReports,
) -> TabWorker {
    let subscription = channel.subscribe();
    let replayed = replay(store.as_ref(), presenter.as_ref());
    tracing::info!(channel = channel.channel_name(), replayed, "tab started");

    let handle = tokio::spawn(run(store, channel, presenter, subscription, dismissals));
    TabWorker { replayed, handle }
}

fn replay(store: &dyn DurableStore, presenter: &dyn Presenter) -> usize {
    match store.list() {
        Ok(records) => {
            for record in records.values() {
                presenter.show(record);
            }
            records.len()
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not read stored notifications");
            0
        }
    }
}

async fn run(
    store: Arc<dyn DurableStore>,
    channel: Arc<dyn Broadcaster>,
    presenter: Arc<dyn Presenter>,
    mut subscription: Subscription,
    mut dismissals: DismissalReports,
) {
    let mut listening = true;
    let mut reporting = true;
    while listening || reporting {
        tokio::select! {
            envelope = subscription.next(), if listening => match envelope {
                Some(envelope) => apply(presenter.as_ref(), envelope),
                None => {
                    tracing::debug!("broadcast subscription ended");
                    listening = false;
                }
            },
            dismissal = dismissals.recv(), if reporting => match dismissal {
                Some(dismissal) => on_dismissed(&store, channel.as_ref(), dismissal).await,
                None => reporting = false,
            },
        }
    }
    tracing::info!(channel = channel.channel_name(), "tab worker stopped");
}

fn apply(presenter: &dyn Presenter, envelope: BroadcastEnvelope) {
    match envelope {
        BroadcastEnvelope::Notification(record) => {
            tracing::debug!(id = %record.id, kind = ?record.kind, "received notification");
            presenter.show(&record);
        }
        // The dismissing tab already deleted the stored entry.
        BroadcastEnvelope::Dismissal(dismissal) => {
            tracing::debug!(id = %dismissal.id, "received dismissal");
            presenter.remove(&dismissal.id);
        }
    }
}

async fn on_dismissed(store: &Arc<dyn DurableStore>, channel: &dyn Broadcaster, dismissal: DismissalEvent) {
    let id = dismissal.id.clone();
    if let Err(e) = offload(store, move |store| store.delete(&id)).await {
        tracing::warn!(error = %e, id = %dismissal.id, "failed to delete dismissed notification");
    }
    channel.publish(&BroadcastEnvelope::Dismissal(dismissal));
}
