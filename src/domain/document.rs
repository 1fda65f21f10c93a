//! Documents produced by the renderer and the files they end up in.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

/// Every well-formed PDF starts with this header.
pub const PDF_MAGIC: &[u8] = b"%PDF-";
pub const PDF_EXTENSION: &str = "pdf";
const MAX_ID_LEN: usize = 128;

/// Caller-supplied (or generated) identifier that names a document on disk.
///
/// Restricted to `[A-Za-z0-9_-]` so it can be used verbatim as a file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("document id must not be empty"));
        }
        if trimmed.len() > MAX_ID_LEN {
            return Err(DomainError::validation(format!(
                "document id must be at most {MAX_ID_LEN} characters"
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::validation(
                "document id may only contain ASCII letters, digits, `-` and `_`",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Recover the identifier from a `{id}.pdf` file name.
    pub fn from_file_name(name: &str) -> Result<Self, DomainError> {
        let stem = name
            .strip_suffix(PDF_EXTENSION)
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(|| DomainError::validation("file name must end in `.pdf`"))?;
        Self::parse(stem)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.{PDF_EXTENSION}", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderWarningKind {
    NavigationTimeout,
    NetworkIdleTimeout,
    SelectorTimeout,
}

impl RenderWarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NavigationTimeout => "navigation_timeout",
            Self::NetworkIdleTimeout => "network_idle_timeout",
            Self::SelectorTimeout => "selector_timeout",
        }
    }
}

/// A non-fatal problem met while rendering. The document is still produced
/// but may be missing content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderWarning {
    pub kind: RenderWarningKind,
    pub message: String,
}

impl RenderWarning {
    pub fn new(kind: RenderWarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// PDF bytes exported by the browser.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    bytes: Bytes,
    warnings: Vec<RenderWarning>,
}

impl RenderedDocument {
    pub fn new(bytes: impl Into<Bytes>, warnings: Vec<RenderWarning>) -> Result<Self, DomainError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(DomainError::invariant("rendered document is empty"));
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(DomainError::invariant(
                "rendered document does not start with a PDF header",
            ));
        }
        Ok(Self { bytes, warnings })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn warnings(&self) -> &[RenderWarning] {
        &self.warnings
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

/// A document written to the output directory, pending deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFile {
    pub id: DocumentId,
    pub path: PathBuf,
    pub created_at: OffsetDateTime,
    pub delete_at: OffsetDateTime,
}

impl PersistedFile {
    pub fn new(
        id: DocumentId,
        path: PathBuf,
        created_at: OffsetDateTime,
        retention: Duration,
    ) -> Self {
        Self {
            id,
            path,
            created_at,
            delete_at: created_at + retention,
        }
    }

    pub fn file_name(&self) -> String {
        self.id.file_name()
    }

    /// Time left before the file is due for deletion; zero once overdue.
    pub fn remaining(&self, now: OffsetDateTime) -> Duration {
        Duration::try_from(self.delete_at - now).unwrap_or(Duration::ZERO)
    }
}
