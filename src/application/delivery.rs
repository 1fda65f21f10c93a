//! Where a finished document goes: back in the response or onto disk.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

use crate::{
    application::janitor::Janitor,
    domain::{
        document::{DocumentId, PersistedFile, RenderedDocument},
        error::DomainError,
    },
    infra::storage::{DocumentStorage, StorageError},
};

/// Path under which persisted documents are served.
pub const RETRIEVAL_PREFIX: &str = "invoices";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Url(#[from] DomainError),
}

/// Delivery mode of a running deployment.
#[derive(Clone)]
pub enum DeliveryTarget {
    Inline,
    Persisted {
        storage: Arc<DocumentStorage>,
        janitor: Janitor,
    },
}

impl DeliveryTarget {
    pub fn persisted(storage: Arc<DocumentStorage>, janitor: Janitor) -> Self {
        Self::Persisted { storage, janitor }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }

    pub fn janitor(&self) -> Option<&Janitor> {
        match self {
            Self::Inline => None,
            Self::Persisted { janitor, .. } => Some(janitor),
        }
    }

    /// Hand the document over. Persisted documents are scheduled for deletion
    /// before this returns.
    pub async fn deliver(
        &self,
        id: DocumentId,
        document: RenderedDocument,
        base_url: &Url,
    ) -> Result<Delivered, DeliveryError> {
        match self {
            Self::Inline => Ok(Delivered::Inline { id, document }),
            Self::Persisted { storage, janitor } => {
                let pdf_url = retrieval_url(base_url, &id)?;
                let _files = janitor.lock_files().await;
                let path = storage.store(&id, document.bytes()).await?;
                let file = PersistedFile::new(
                    id,
                    path,
                    OffsetDateTime::now_utc(),
                    janitor.retention(),
                );
                janitor.schedule(&file);
                Ok(Delivered::Persisted {
                    file,
                    pdf_url,
                    warnings: document.warning_messages(),
                })
            }
        }
    }

    /// Read a persisted document back. Inline deployments store nothing.
    pub async fn fetch(&self, file_name: &str) -> Result<Bytes, StorageError> {
        match self {
            Self::Inline => Err(StorageError::InvalidPath),
            Self::Persisted { storage, .. } => storage.read(file_name).await,
        }
    }
}

#[derive(Debug)]
pub enum Delivered {
    Inline {
        id: DocumentId,
        document: RenderedDocument,
    },
    Persisted {
        file: PersistedFile,
        pdf_url: Url,
        warnings: Vec<String>,
    },
}

impl Delivered {
    pub fn pdf_url(&self) -> Option<&Url> {
        match self {
            Self::Inline { .. } => None,
            Self::Persisted { pdf_url, .. } => Some(pdf_url),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        match self {
            Self::Inline { document, .. } => document.warning_messages(),
            Self::Persisted { warnings, .. } => warnings.clone(),
        }
    }
}

/// Router path serving the documents that [`retrieval_url`] links to.
pub fn retrieval_route() -> String {
    format!("/{RETRIEVAL_PREFIX}/{{filename}}")
}

/// `{base}/invoices/{id}.pdf`, tolerating bases with or without a trailing slash.
pub fn retrieval_url(base: &Url, id: &DocumentId) -> Result<Url, DomainError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(&format!("{RETRIEVAL_PREFIX}/{}", id.file_name()))
        .map_err(|err| DomainError::invariant(format!("cannot build retrieval URL: {err}")))
}
