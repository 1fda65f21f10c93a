//! Credential checks for the generate endpoint.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{config::AuthSettings, domain::request::Credential};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential")]
    Invalid,
}

/// Decides whether a caller may trigger a render.
///
/// With `required` off every request passes. With it on a credential must be
/// present; when tokens are configured it must also match one of them.
#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    required: bool,
    token_digests: Vec<Vec<u8>>,
}

impl AuthPolicy {
    pub fn new(required: bool, tokens: &[String]) -> Self {
        Self {
            required,
            token_digests: tokens.iter().map(|token| digest(token)).collect(),
        }
    }

    pub fn open() -> Self {
        Self::default()
    }

    pub fn authenticate(&self, credential: Option<&Credential>) -> Result<(), AuthError> {
        if !self.required {
            return Ok(());
        }

        let credential = credential.ok_or(AuthError::Missing)?;
        if self.token_digests.is_empty() {
            return Ok(());
        }

        let presented = digest(credential.expose());
        let matched = self
            .token_digests
            .iter()
            .fold(0u8, |acc, known| acc | known.ct_eq(&presented).unwrap_u8());
        if matched == 1 {
            Ok(())
        } else {
            Err(AuthError::Invalid)
        }
    }
}

impl From<&AuthSettings> for AuthPolicy {
    fn from(settings: &AuthSettings) -> Self {
        Self::new(settings.required, &settings.tokens)
    }
}

fn digest(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
