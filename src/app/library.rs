use super::Recorder;
use crate::archive::{self, ArchiveKey, ArchiveRecord};
use crate::error::Result;
use crate::events::RecorderEvent;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, info};

impl Recorder {
    /// All stored recordings, ordered by key
    pub async fn list(&self) -> Result<Vec<ArchiveRecord>> {
        Ok(self.archive.list().await?)
    }

    /// One stored recording; a miss is `Ok(None)`
    pub async fn get(&self, key: ArchiveKey) -> Result<Option<ArchiveRecord>> {
        Ok(self.archive.get(key).await?)
    }

    /// Export every stored recording into `dir`, or the configured export
    /// directory
    pub async fn export_all(&self, dir: Option<&Path>) -> Result<Vec<PathBuf>> {
        let dir = dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&self.config.export.directory));

        let written =
            archive::export_all(self.archive.as_ref(), &dir, &self.config.export.file_prefix)
                .await
                .map_err(|e| {
                    error!("Failed to export recordings to {}: {}", dir.display(), e);
                    e
                })?;

        self.event_bus.emit(RecorderEvent::RecordingsExported {
            count: written.len(),
        });
        Ok(written)
    }

    /// Export one recording to `path`. `Ok(None)` when there is nothing
    /// stored under `key`.
    pub async fn export_one(&self, key: ArchiveKey, path: &Path) -> Result<Option<PathBuf>> {
        let written = archive::export_one(self.archive.as_ref(), key, path).await?;
        if written.is_some() {
            self.event_bus
                .emit(RecorderEvent::RecordingsExported { count: 1 });
        }
        Ok(written)
    }

    /// Delete the whole archive database
    pub async fn clear(&self) -> Result<()> {
        self.archive.delete_all().await.map_err(|e| {
            error!("Failed to delete archive: {}", e);
            e
        })?;

        info!("Archive {} cleared", self.config.archive.database);
        self.event_bus.emit(RecorderEvent::ArchiveCleared {
            timestamp: SystemTime::now(),
        });
        Ok(())
    }
}
