//! Shared fixtures: in-process "tabs" that share an origin through a
//! `MemoryBlob` (storage) and a `LocalHub` (broadcast).

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokenform_notify::db::{memory_store, DurableStore, MemoryBlob};
use tokenform_notify::provider::{ScriptedProvider, TokenDescriptor, TransferRequest};
use tokenform_notify::realtime::{Broadcaster, Delivery, LocalHub, Unsupported};
use tokenform_notify::{spawn_tab_worker, NotificationSink, SubmissionController, TabWorker, ToastBoard};

pub const CHANNEL: &str = "token-form-notification";

pub struct Tab {
    pub board: Arc<ToastBoard>,
    pub store: Arc<dyn DurableStore>,
    pub channel: Arc<dyn Broadcaster>,
    pub controller: SubmissionController,
    pub worker: TabWorker,
}

impl Tab {
    pub fn open(blob: &MemoryBlob, hub: &LocalHub, provider: Arc<ScriptedProvider>) -> Self {
        Self::with_channel(blob, Arc::new(hub.channel(CHANNEL, Delivery::Others)), provider)
    }

    pub fn offline(blob: &MemoryBlob, provider: Arc<ScriptedProvider>) -> Self {
        Self::with_channel(blob, Arc::new(Unsupported::new(CHANNEL)), provider)
    }

    pub fn with_channel(blob: &MemoryBlob, channel: Arc<dyn Broadcaster>, provider: Arc<ScriptedProvider>) -> Self {
        let store = memory_store(blob);
        let (board, reports) = ToastBoard::new();
        let board = Arc::new(board);
        let worker = spawn_tab_worker(store.clone(), channel.clone(), board.clone(), reports);
        let sink = NotificationSink::new(store.clone(), channel.clone(), board.clone());
        let controller = SubmissionController::new(provider, sink);
        Self { board, store, channel, controller, worker }
    }

    pub fn close(self) {
        self.worker.handle.abort();
    }
}

pub fn recipient() -> Address {
    "0x1111000000000000000000000000000000001234".parse().expect("test: recipient address")
}

pub fn eth(amount: &str) -> TransferRequest {
    TransferRequest::new(amount, recipient(), TokenDescriptor::native("ETH", "Ether"))
}

/// Polls `cond` until it holds or a second has passed.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
