//! Persistence of the contact list.
//!
//! Only identifiers are stored; keys and presence are rediscovered on load.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use murmur_identity::PeerId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tracing::debug;

/// Errors from a [`ContactStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] io::Error),

    /// The stored document is not a valid contact list.
    #[error("malformed contact list: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable home for the list of contact identifiers.
#[async_trait]
pub trait ContactStore: Send + Sync + 'static {
    /// Replaces the stored list.
    async fn save(&self, contacts: &[PeerId]) -> Result<(), StoreError>;

    /// Returns the stored list, or an empty list if nothing was saved yet.
    async fn load(&self) -> Result<Vec<PeerId>, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ContactRecord {
    id: PeerId,
}

/// Stores the contact list as a JSON array of `{"id": ...}` objects.
#[derive(Clone, Debug)]
pub struct FsContactStore {
    path: PathBuf,
}

impl FsContactStore {
    /// File name used by [`FsContactStore::in_dir`].
    pub const FILE_NAME: &'static str = "state";

    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store backed by `<dir>/state`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(Self::FILE_NAME))
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ContactStore for FsContactStore {
    async fn save(&self, contacts: &[PeerId]) -> Result<(), StoreError> {
        let records: Vec<_> = contacts
            .iter()
            .map(|id| ContactRecord { id: id.clone() })
            .collect();
        let json = serde_json::to_vec_pretty(&records)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Io("error creating directory", e))?;
            }
        }

        // Write aside and rename so a crash never leaves a torn file.
        let temp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| StoreError::Io("error creating file", e))?;
        file.write_all(&json)
            .await
            .map_err(|e| StoreError::Io("error writing file", e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::Io("error syncing file", e))?;
        drop(file);

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::Io("error replacing file", e))?;

        debug!(path = %self.path.display(), count = contacts.len(), "saved contacts");
        Ok(())
    }

    async fn load(&self) -> Result<Vec<PeerId>, StoreError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io("error reading file", e)),
        };

        let records: Vec<ContactRecord> = serde_json::from_slice(&data)?;
        debug!(path = %self.path.display(), count = records.len(), "loaded contacts");

        Ok(records.into_iter().map(|record| record.id).collect())
    }
}

/// Keeps the contact list in memory. Clones share the same list.
#[derive(Clone, Debug, Default)]
pub struct MemoryContactStore {
    contacts: Arc<Mutex<Vec<PeerId>>>,
}

impl MemoryContactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored list.
    #[must_use]
    pub fn contacts(&self) -> Vec<PeerId> {
        self.contacts.lock().clone()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn save(&self, contacts: &[PeerId]) -> Result<(), StoreError> {
        *self.contacts.lock() = contacts.to_vec();
        Ok(())
    }

    async fn load(&self) -> Result<Vec<PeerId>, StoreError> {
        Ok(self.contacts.lock().clone())
    }
}
