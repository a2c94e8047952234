use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tokenform_notify::config::{self, BroadcastBackend, Settings, StorageBackend};
use tokenform_notify::db::{self, file::FileBlob, redis::RedisBlob, DurableStore, JsonStore, MemoryBlob};
use tokenform_notify::realtime::{bridge, redis_channel::RedisChannel, Delivery, LocalHub};
use tokenform_notify::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing setup
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .init();

    // Load env
    config::load_dotenv();
    let settings = Settings::from_env()?;

    let store = build_store(&settings)?;
    let app_state = match settings.broadcast {
        BroadcastBackend::Local => routes::AppState::new(store, LocalHub::new(), &settings.channel_name),
        BroadcastBackend::Redis => {
            let hub = LocalHub::new();
            let client = db::redis::create_redis_client(redis_url(&settings)?)?;
            let remote = RedisChannel::open(client, &settings.channel_name);
            bridge::spawn_bridge(Arc::new(hub.channel(&settings.channel_name, Delivery::Others)), Arc::new(remote));
            routes::AppState::new(store, hub, &settings.channel_name)
        }
        BroadcastBackend::Off => {
            tracing::warn!("broadcast disabled, tabs will only see their own notifications");
            routes::AppState::isolated(store, &settings.channel_name)
        }
    };

    let app = routes::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(settings.cors_layer());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn DurableStore>> {
    let store: Arc<dyn DurableStore> = match &settings.storage {
        StorageBackend::Memory => Arc::new(JsonStore::new(MemoryBlob::new())),
        StorageBackend::File(path) => Arc::new(JsonStore::new(FileBlob::new(path))),
        StorageBackend::Redis => {
            let client = db::redis::create_redis_client(redis_url(settings)?)?;
            Arc::new(JsonStore::new(RedisBlob::new(client, &settings.storage_key)))
        }
    };
    Ok(store)
}

fn redis_url(settings: &Settings) -> anyhow::Result<&str> {
    settings
        .redis_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("REDIS_URL is required"))
}
