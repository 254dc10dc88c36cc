use super::file_store::write_replace;
use super::record::{ArchiveKey, ArchiveRecord};
use super::store::Archive;
use crate::error::StorageError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// File name for the record at 1-based `position` in a listing
pub fn export_file_name(prefix: &str, position: usize, record: &ArchiveRecord) -> String {
    format!("{}-{}.{}", prefix, position, record.format.extension())
}

/// Write every stored payload into `dest_dir` as `<prefix>-<n>.<ext>`.
///
/// `n` is the record's position in the listing, so a record without payload
/// leaves a gap in the numbering.
pub async fn export_all(
    archive: &dyn Archive,
    dest_dir: &Path,
    prefix: &str,
) -> Result<Vec<PathBuf>, StorageError> {
    let records = archive.list().await?;

    fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| StorageError::Open {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let Some(payload) = &record.payload else {
            warn!("Record {} has no payload, skipping export", record.key);
            continue;
        };

        let path = dest_dir.join(export_file_name(prefix, index + 1, record));
        write_replace(&path, payload).await?;
        debug!("Exported record {} to {}", record.key, path.display());
        written.push(path);
    }

    info!(
        "Exported {} of {} recordings to {}",
        written.len(),
        records.len(),
        dest_dir.display()
    );
    Ok(written)
}

/// Write one record's payload to `path`. `Ok(None)` when the key is unknown
/// or has no payload.
pub async fn export_one(
    archive: &dyn Archive,
    key: ArchiveKey,
    path: &Path,
) -> Result<Option<PathBuf>, StorageError> {
    let Some(record) = archive.get(key).await? else {
        debug!("No record stored under key {}", key);
        return Ok(None);
    };

    let Some(payload) = &record.payload else {
        warn!("Record {} has no payload", key);
        return Ok(None);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::Open {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    write_replace(path, payload).await?;
    info!("Exported record {} to {}", key, path.display());
    Ok(Some(path.to_path_buf()))
}
