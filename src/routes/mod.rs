use std::sync::Arc;

use axum::{Router, routing::get};

use crate::db::DurableStore;
use crate::realtime::{ws, Broadcaster, Delivery, LocalHub, Unsupported};

pub mod notifications;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DurableStore>,
    pub hub: LocalHub,
    pub channel_name: String,
    /// The relay's own channel instance, used for changes made over HTTP.
    pub channel: Arc<dyn Broadcaster>,
    relaying: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn DurableStore>, hub: LocalHub, channel_name: &str) -> Self {
        let channel = Arc::new(hub.channel(channel_name, Delivery::Others));
        Self { store, hub, channel_name: channel_name.to_string(), channel, relaying: true }
    }

    /// Broadcast disabled: every tab and the HTTP routes get a channel that
    /// drops what is published and never delivers.
    pub fn isolated(store: Arc<dyn DurableStore>, channel_name: &str) -> Self {
        Self {
            store,
            hub: LocalHub::new(),
            channel_name: channel_name.to_string(),
            channel: Arc::new(Unsupported::new(channel_name)),
            relaying: false,
        }
    }

    pub fn is_relaying(&self) -> bool {
        self.relaying
    }

    /// A fresh channel instance for one connected tab.
    pub fn open_tab(&self) -> Arc<dyn Broadcaster> {
        if self.relaying {
            Arc::new(self.hub.channel(&self.channel_name, Delivery::Others))
        } else {
            Arc::new(Unsupported::new(&self.channel_name))
        }
    }
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(|| async { "ok" }))
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/notifications", notifications::router())
        .merge(ws::router())
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health_router())
        .nest("/api", api_router())
        .with_state(state)
}
