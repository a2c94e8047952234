use std::path::PathBuf;
use std::time::Duration;

use axum::http;
use tower_http::cors::{Any, CorsLayer};

use crate::db::DEFAULT_STORAGE_KEY;
use crate::errors::ConfigError;
use crate::realtime::DEFAULT_CHANNEL_NAME;

pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File(PathBuf),
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastBackend {
    Local,
    Redis,
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub channel_name: String,
    pub storage: StorageBackend,
    pub storage_key: String,
    pub broadcast: BroadcastBackend,
    pub redis_url: Option<String>,
    pub port: u16,
    pub allowed_origins: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage = match var("STORAGE_BACKEND", "file").as_str() {
            "memory" => StorageBackend::Memory,
            "file" => StorageBackend::File(PathBuf::from(var("STORAGE_PATH", "tx_data.json"))),
            "redis" => StorageBackend::Redis,
            other => return Err(ConfigError::Invalid { var: "STORAGE_BACKEND", value: other.to_string() }),
        };
        let broadcast = match var("BROADCAST_BACKEND", "local").as_str() {
            "local" => BroadcastBackend::Local,
            "redis" => BroadcastBackend::Redis,
            "off" => BroadcastBackend::Off,
            other => return Err(ConfigError::Invalid { var: "BROADCAST_BACKEND", value: other.to_string() }),
        };
        let port_raw = var("SERVER_PORT", "8080");
        let port: u16 = port_raw
            .parse()
            .map_err(|_| ConfigError::Invalid { var: "SERVER_PORT", value: port_raw.clone() })?;

        let redis_url = lookup("REDIS_URL");
        if redis_url.is_none() {
            if storage == StorageBackend::Redis {
                return Err(ConfigError::Missing { var: "REDIS_URL", reason: "STORAGE_BACKEND=redis" });
            }
            if broadcast == BroadcastBackend::Redis {
                return Err(ConfigError::Missing { var: "REDIS_URL", reason: "BROADCAST_BACKEND=redis" });
            }
        }

        Ok(Self {
            channel_name: var("NOTIFY_CHANNEL", DEFAULT_CHANNEL_NAME),
            storage,
            storage_key: var("STORAGE_KEY", DEFAULT_STORAGE_KEY),
            broadcast,
            redis_url,
            port,
            allowed_origins: var("ALLOWED_ORIGINS", "*"),
        })
    }

    pub fn cors_layer(&self) -> CorsLayer {
        if self.allowed_origins == "*" {
            CorsLayer::very_permissive()
        } else {
            let origin: http::HeaderValue =
                self.allowed_origins.parse().unwrap_or(http::HeaderValue::from_static("*"));
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([http::Method::GET, http::Method::PUT, http::Method::DELETE])
                .allow_headers(Any)
                .max_age(Duration::from_secs(60 * 60))
        }
    }
}
