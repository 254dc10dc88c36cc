use super::record::{ArchiveKey, ArchiveRecord};
use crate::chunk::FinalizedRecording;
use crate::error::StorageError;
use async_trait::async_trait;

/// Durable key-value store of finalized recordings.
///
/// Mutating calls (`put`, `delete_all`) are not serialized internally; callers
/// must not overlap them on the same collection.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Store a recording under a freshly generated key
    async fn put(&self, recording: &FinalizedRecording) -> Result<ArchiveKey, StorageError>;

    /// Every stored record, ordered by key
    async fn list(&self) -> Result<Vec<ArchiveRecord>, StorageError>;

    /// Point lookup; a miss is `Ok(None)`
    async fn get(&self, key: ArchiveKey) -> Result<Option<ArchiveRecord>, StorageError>;

    /// Number of stored records
    async fn count(&self) -> Result<usize, StorageError>;

    /// Irreversibly remove the whole database. Succeeds when nothing exists.
    async fn delete_all(&self) -> Result<(), StorageError>;
}
