//! Credential providers.
//!
//! The session asks for a credential before every reconnection attempt, so a
//! provider should return the currently valid token (refreshing it if needed).
//! `Ok(None)` means "nothing available right now"; the session retries later.

use async_trait::async_trait;

use chatwire_core::error::{ChatwireError, Result};

#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    async fn credential(&self) -> Result<Option<String>>;
}

/// Fixed token (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn none() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credential(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn credential(&self) -> Result<Option<String>> {
        match std::env::var(&self.var) {
            Ok(v) if !v.trim().is_empty() => Ok(Some(v.trim().to_string())),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ChatwireError::Credential(format!("{}: {e}", self.var))),
        }
    }
}
