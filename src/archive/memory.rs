use super::key::KeyGenerator;
use super::record::{ArchiveKey, ArchiveRecord};
use super::store::Archive;
use crate::chunk::FinalizedRecording;
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

/// In-process archive, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryArchive {
    records: Mutex<BTreeMap<ArchiveKey, ArchiveRecord>>,
    keys: KeyGenerator,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Archive for MemoryArchive {
    async fn put(&self, recording: &FinalizedRecording) -> Result<ArchiveKey, StorageError> {
        let mut records = self.records.lock();
        let mut key = self.keys.next();
        while records.contains_key(&key) {
            self.keys.observe(key);
            key = self.keys.next();
        }
        records.insert(key, ArchiveRecord::new(key, recording));
        debug!("Stored {} bytes in memory under key {}", recording.len(), key);
        Ok(key)
    }

    async fn list(&self) -> Result<Vec<ArchiveRecord>, StorageError> {
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn get(&self, key: ArchiveKey) -> Result<Option<ArchiveRecord>, StorageError> {
        Ok(self.records.lock().get(&key).cloned())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.records.lock().len())
    }

    async fn delete_all(&self) -> Result<(), StorageError> {
        self.records.lock().clear();
        Ok(())
    }
}
