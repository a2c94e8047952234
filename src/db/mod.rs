use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::StoreError;
use crate::model::NotificationRecord;

pub mod file;
pub mod redis;

pub const DEFAULT_STORAGE_KEY: &str = "TX_DATA";

pub type Records = BTreeMap<String, NotificationRecord>;

// Whole JSON object under one key; concurrent tabs resolve last-write-wins.
pub trait DurableStore: Send + Sync {
    fn list(&self) -> Result<Records, StoreError>;
    /// Upserts by `record.id`.
    fn put(&self, record: &NotificationRecord) -> Result<(), StoreError>;
    /// Absent ids are not an error.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Runs a store call on the blocking pool. File and Redis backends do
/// synchronous I/O, which must stay off the async workers.
pub async fn offload<T, F>(store: &Arc<dyn DurableStore>, call: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn DurableStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || call(store.as_ref())).await?
}

/// Raw storage of the serialized blob.
pub trait BlobBackend: Send + Sync {
    fn read(&self) -> Result<Option<String>, StoreError>;
    fn write(&self, blob: &str) -> Result<(), StoreError>;
}

pub struct JsonStore<B> {
    backend: B,
    // Serializes read-modify-write within this instance only.
    lock: Mutex<()>,
}

impl<B: BlobBackend> JsonStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, lock: Mutex::new(()) }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn load(&self) -> Result<Records, StoreError> {
        let Some(raw) = self.backend.read()? else {
            return Ok(Records::new());
        };
        match serde_json::from_str::<Records>(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(error = %e, "stored notifications are unreadable, starting empty");
                Ok(Records::new())
            }
        }
    }

    fn save(&self, records: &Records) -> Result<(), StoreError> {
        let blob = serde_json::to_string(records)?;
        self.backend.write(&blob)
    }
}

impl<B: BlobBackend> DurableStore for JsonStore<B> {
    fn list(&self) -> Result<Records, StoreError> {
        let _guard = self.lock.lock();
        self.load()
    }

    fn put(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;
        records.insert(record.id.clone(), record.clone());
        self.save(&records)?;
        tracing::debug!(id = %record.id, kind = ?record.kind, "stored notification");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;
        if records.remove(id).is_some() {
            self.save(&records)?;
            tracing::debug!(id, "deleted notification");
        }
        Ok(())
    }
}

/// In-process blob. Clones share the same slot, which is how several tabs of
/// one origin see a single storage area.
#[derive(Clone, Default)]
pub struct MemoryBlob {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    pub fn set_raw(&self, blob: impl Into<String>) {
        *self.slot.lock() = Some(blob.into());
    }
}

impl BlobBackend for MemoryBlob {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot.lock().clone())
    }

    fn write(&self, blob: &str) -> Result<(), StoreError> {
        *self.slot.lock() = Some(blob.to_string());
        Ok(())
    }
}

pub fn memory_store(blob: &MemoryBlob) -> Arc<dyn DurableStore> {
    Arc::new(JsonStore::new(blob.clone()))
}
