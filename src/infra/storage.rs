//! Filesystem storage for persisted PDF documents.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::domain::document::{DocumentId, PDF_EXTENSION};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True for lookups of files that never existed or were already removed.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::InvalidPath => true,
            Self::Io(err) => err.kind() == ErrorKind::NotFound,
        }
    }
}

/// A document found on disk while scanning the output directory.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub file_name: String,
    pub modified: SystemTime,
}

/// Output directory holding `{id}.pdf` files.
#[derive(Debug)]
pub struct DocumentStorage {
    root: PathBuf,
}

impl DocumentStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the document under `{id}.pdf`, replacing any previous file with that name.
    ///
    /// Bytes land in a hidden temporary file first and are renamed into place,
    /// so readers never observe a partially written PDF.
    pub async fn store(&self, id: &DocumentId, data: &Bytes) -> Result<PathBuf, StorageError> {
        let file_name = id.file_name();
        let absolute = self.resolve(&file_name)?;
        let staging = self
            .root
            .join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

        let mut file = fs::File::create(&staging).await?;
        if let Err(err) = write_all(&mut file, data).await {
            drop(file);
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        drop(file);

        if let Err(err) = fs::rename(&staging, &absolute).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }

        Ok(absolute)
    }

    /// Read a stored document into memory.
    pub async fn read(&self, file_name: &str) -> Result<Bytes, StorageError> {
        let absolute = self.resolve(file_name)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove a stored document. Returns `false` when it was already gone.
    pub async fn delete(&self, file_name: &str) -> Result<bool, StorageError> {
        let absolute = self.resolve(file_name)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// List stored documents with their modification times. Staging files are skipped.
    pub async fn list(&self) -> Result<Vec<StoredEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if DocumentId::from_file_name(&file_name).is_err() {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(StoredEntry {
                file_name,
                modified: metadata.modified()?,
            });
        }
        Ok(entries)
    }

    /// Resolve a bare `{id}.pdf` name inside the root; anything else is rejected.
    fn resolve(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(file_name);
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(StorageError::InvalidPath),
        }
        if relative.extension().and_then(|ext| ext.to_str()) != Some(PDF_EXTENSION) {
            return Err(StorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

async fn write_all(file: &mut fs::File, data: &Bytes) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}
