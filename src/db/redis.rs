use parking_lot::Mutex;
use redis::{Client, Commands, Connection};

use crate::errors::StoreError;

use super::BlobBackend;

pub fn create_redis_client(url: &str) -> anyhow::Result<Client> {
    let client = Client::open(url)?;
    Ok(client)
}

/// Blob stored as one Redis string. Every tab pointed at the same key shares
/// the notification set.
pub struct RedisBlob {
    client: Client,
    key: String,
    conn: Mutex<Option<Connection>>,
}

impl RedisBlob {
    pub fn new(client: Client, key: impl Into<String>) -> Self {
        Self { client, key: key.into(), conn: Mutex::new(None) }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    // One connection is kept and reused; it is dropped after any error so the
    // next call reconnects.
    fn with_conn<T>(&self, op: impl FnOnce(&mut Connection) -> redis::RedisResult<T>) -> Result<T, StoreError> {
        let mut slot = self.conn.lock();
        let conn = match slot.as_mut() {
            Some(conn) => conn,
            None => slot.insert(self.client.get_connection()?),
        };
        match op(conn) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(error = %e, key = %self.key, "redis blob call failed, reconnecting next time");
                *slot = None;
                Err(e.into())
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }
}

impl BlobBackend for RedisBlob {
    fn read(&self) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| conn.get(&self.key))
    }

    fn write(&self, blob: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| conn.set(&self.key, blob))
    }
}
