//! A single render request, validated.

use std::fmt;

use url::Url;

use super::{document::DocumentId, error::DomainError};

/// Bearer token or API key presented by the caller. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub target: Url,
    pub id: DocumentId,
    pub callback: Option<Url>,
    pub credential: Option<Credential>,
}

impl RenderRequest {
    /// Validate raw request fields. A missing id is replaced by a generated one.
    pub fn parse(
        url: &str,
        id: Option<&str>,
        callback_url: Option<&str>,
        credential: Option<Credential>,
    ) -> Result<Self, DomainError> {
        let target = parse_web_url("url", url)?;
        let id = match id.map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => DocumentId::parse(raw)?,
            None => DocumentId::generate(),
        };
        let callback = callback_url
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|raw| parse_web_url("callback_url", raw))
            .transpose()?;

        Ok(Self {
            target,
            id,
            callback,
            credential,
        })
    }
}

/// Parse an absolute `http`/`https` URL with a host.
pub fn parse_web_url(field: &'static str, raw: &str) -> Result<Url, DomainError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| DomainError::validation(format!("`{field}` is not a valid URL: {err}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DomainError::validation(format!(
                "`{field}` must use http or https, got `{other}`"
            )));
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(DomainError::validation(format!("`{field}` must include a host")));
    }
    Ok(url)
}
