use super::key::KeyGenerator;
use super::record::{ArchiveKey, ArchiveRecord, RecordMetadata};
use super::store::Archive;
use crate::chunk::{ContainerFormat, FinalizedRecording};
use crate::config::ArchiveConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const SCHEMA_FILE: &str = "schema.json";
const METADATA_EXT: &str = "json";
const MAX_KEY_ATTEMPTS: u32 = 1000;

/// Marker describing the database layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SchemaMarker {
    name: String,
    version: u32,
    collections: Vec<String>,
}

/// Filesystem archive: `<path>/<database>/<collection>/<key>.{json,<ext>}`
pub struct FileArchive {
    database_dir: PathBuf,
    database: String,
    collection: String,
    version: u32,
    keys: KeyGenerator,
}

impl FileArchive {
    /// Open the database, running schema setup on first use or version bump.
    /// Safe to call repeatedly.
    pub async fn open(config: &ArchiveConfig) -> Result<Self, StorageError> {
        let archive = Self {
            database_dir: PathBuf::from(&config.path).join(&config.database),
            database: config.database.clone(),
            collection: config.collection.clone(),
            version: config.version,
            keys: KeyGenerator::new(),
        };

        archive.ensure_schema().await?;

        info!(
            "Opened archive {} (collection '{}', version {}) at {}",
            archive.database,
            archive.collection,
            archive.version,
            archive.database_dir.display()
        );
        Ok(archive)
    }

    pub fn database_dir(&self) -> &Path {
        &self.database_dir
    }

    fn collection_dir(&self) -> PathBuf {
        self.database_dir.join(&self.collection)
    }

    fn metadata_path(&self, key: ArchiveKey) -> PathBuf {
        self.collection_dir().join(format!("{}.{}", key, METADATA_EXT))
    }

    /// Create the database and collection if missing, upgrade the marker if
    /// the configured version is newer
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.database_dir)
            .await
            .map_err(|e| StorageError::Open {
                path: self.database_dir.clone(),
                source: e,
            })?;

        let marker_path = self.database_dir.join(SCHEMA_FILE);
        let existing = match fs::read(&marker_path).await {
            Ok(content) => Some(serde_json::from_slice::<SchemaMarker>(&content).map_err(
                |e| StorageError::Corrupt {
                    path: marker_path.clone(),
                    details: e.to_string(),
                },
            )?),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                return Err(StorageError::Open {
                    path: marker_path,
                    source: e,
                })
            }
        };

        if let Some(marker) = &existing {
            if marker.version > self.version {
                return Err(StorageError::VersionMismatch {
                    found: marker.version,
                    expected: self.version,
                });
            }
        }

        let collection_dir = self.collection_dir();
        let needs_upgrade = match &existing {
            None => true,
            Some(marker) => {
                marker.version < self.version || !marker.collections.contains(&self.collection)
            }
        };

        fs::create_dir_all(&collection_dir)
            .await
            .map_err(|e| StorageError::Open {
                path: collection_dir.clone(),
                source: e,
            })?;

        if needs_upgrade {
            let mut collections = existing.map(|m| m.collections).unwrap_or_default();
            if !collections.contains(&self.collection) {
                collections.push(self.collection.clone());
            }
            let marker = SchemaMarker {
                name: self.database.clone(),
                version: self.version,
                collections,
            };
            let content = serde_json::to_vec_pretty(&marker).map_err(|e| StorageError::Corrupt {
                path: marker_path.clone(),
                details: e.to_string(),
            })?;
            write_replace(&marker_path, &content).await?;
            info!(
                "Archive schema for {} set up at version {} (collection '{}')",
                self.database, self.version, self.collection
            );
        }

        Ok(())
    }

    /// Claim an unused key by creating its metadata file exclusively
    async fn reserve_key(&self) -> Result<(ArchiveKey, fs::File), StorageError> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = self.keys.next();
            let path = self.metadata_path(key);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((key, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Archive key {} already taken, retrying", key);
                    self.keys.observe(key);
                }
                Err(e) => {
                    return Err(StorageError::io(
                        format!("Failed to reserve key file {}", path.display()),
                        e,
                    ))
                }
            }
        }

        Err(StorageError::KeyExhausted {
            attempts: MAX_KEY_ATTEMPTS,
        })
    }

    async fn write_record(
        &self,
        key: ArchiveKey,
        mut metadata_file: fs::File,
        recording: &FinalizedRecording,
    ) -> Result<(), StorageError> {
        let payload_file = format!("{}.{}", key, recording.format.extension());
        let payload_path = self.collection_dir().join(&payload_file);
        write_replace(&payload_path, &recording.data).await?;

        let metadata = RecordMetadata {
            key,
            created_at: Utc::now(),
            media_type: recording.mime_type().to_string(),
            size: recording.len() as u64,
            payload_file,
        };
        let content = serde_json::to_vec_pretty(&metadata).map_err(|e| StorageError::Corrupt {
            path: self.metadata_path(key),
            details: e.to_string(),
        })?;

        metadata_file
            .write_all(&content)
            .await
            .map_err(|e| StorageError::io("Failed to write record metadata", e))?;
        metadata_file
            .sync_all()
            .await
            .map_err(|e| StorageError::io("Failed to sync record metadata", e))?;

        Ok(())
    }

    /// Read and check one metadata sidecar. `Ok(None)` for missing or not yet
    /// written entries.
    async fn load_metadata(
        &self,
        key: ArchiveKey,
    ) -> Result<Option<(RecordMetadata, ContainerFormat)>, StorageError> {
        let metadata_path = self.metadata_path(key);
        let content = match fs::read(&metadata_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::io(
                    format!("Failed to read {}", metadata_path.display()),
                    e,
                ))
            }
        };

        // reserved by a put that has not finished
        if content.is_empty() {
            return Ok(None);
        }

        let metadata: RecordMetadata =
            serde_json::from_slice(&content).map_err(|e| StorageError::Corrupt {
                path: metadata_path.clone(),
                details: e.to_string(),
            })?;

        if metadata.key != key || !is_plain_file_name(&metadata.payload_file) {
            return Err(StorageError::Corrupt {
                path: metadata_path,
                details: format!("inconsistent entry for key {}", key),
            });
        }

        let format = ContainerFormat::from_mime_type(&metadata.media_type).ok_or_else(|| {
            StorageError::Corrupt {
                path: metadata_path.clone(),
                details: format!("unknown media type '{}'", metadata.media_type),
            }
        })?;

        Ok(Some((metadata, format)))
    }

    /// Load one record. `Ok(None)` for missing or not yet written entries.
    async fn load(&self, key: ArchiveKey) -> Result<Option<ArchiveRecord>, StorageError> {
        let Some((metadata, format)) = self.load_metadata(key).await? else {
            return Ok(None);
        };

        let payload_path = self.collection_dir().join(&metadata.payload_file);
        let payload = match fs::read(&payload_path).await {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Payload for archive key {} is missing", key);
                None
            }
            Err(e) => {
                return Err(StorageError::io(
                    format!("Failed to read {}", payload_path.display()),
                    e,
                ))
            }
        };

        Ok(Some(ArchiveRecord {
            key,
            created_at: metadata.created_at,
            format,
            payload,
        }))
    }

    /// Keys present in the collection, ascending
    async fn keys(&self) -> Result<Vec<ArchiveKey>, StorageError> {
        let collection_dir = self.collection_dir();
        let mut entries = match fs::read_dir(&collection_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::io(
                    format!("Failed to read collection {}", collection_dir.display()),
                    e,
                ))
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io("Failed to read collection entry", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXT) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<ArchiveKey>().ok())
            {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl Archive for FileArchive {
    async fn put(&self, recording: &FinalizedRecording) -> Result<ArchiveKey, StorageError> {
        // recreates the database after delete_all
        self.ensure_schema().await?;

        let (key, metadata_file) = self.reserve_key().await?;

        if let Err(e) = self.write_record(key, metadata_file, recording).await {
            let _ = fs::remove_file(self.metadata_path(key)).await;
            let payload_path = self
                .collection_dir()
                .join(format!("{}.{}", key, recording.format.extension()));
            let _ = fs::remove_file(payload_path).await;
            return Err(e);
        }

        info!(
            "Video stored successfully with key {} ({} bytes)",
            key,
            recording.len()
        );
        Ok(key)
    }

    async fn list(&self) -> Result<Vec<ArchiveRecord>, StorageError> {
        let mut records = Vec::new();
        for key in self.keys().await? {
            match self.load(key).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!("Skipping incomplete archive entry {}", key),
                Err(StorageError::Corrupt { path, details }) => {
                    warn!("Skipping corrupt archive entry {}: {}", path.display(), details);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    async fn get(&self, key: ArchiveKey) -> Result<Option<ArchiveRecord>, StorageError> {
        self.load(key).await
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let mut total = 0;
        for key in self.keys().await? {
            match self.load_metadata(key).await {
                Ok(Some(_)) => total += 1,
                Ok(None) | Err(StorageError::Corrupt { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    async fn delete_all(&self) -> Result<(), StorageError> {
        match fs::remove_dir_all(&self.database_dir).await {
            Ok(()) => {
                info!("Database {} deleted", self.database);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Database {} already absent", self.database);
                Ok(())
            }
            Err(e) => Err(StorageError::io(
                format!("Failed to delete {}", self.database_dir.display()),
                e,
            )),
        }
    }
}

/// Write to a temporary sibling, then rename over `path`
pub(crate) async fn write_replace(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("entry");
    let tmp_path = path.with_file_name(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4()));

    let result = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StorageError::io(
            format!("Failed to write {}", path.display()),
            e,
        ));
    }
    Ok(())
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}
