//! Credential values and the delegated token-provider seam.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ParleyError;

/// A credential used to open the realtime transport.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Credential {
    /// Resource API key, sent as the `api-key` header.
    ApiKey(String),
    /// Bearer token, sent as `Authorization: Bearer ...`.
    BearerToken(String),
    /// Environment variable holding an API key, read at resolve time.
    EnvVar(String),
}

impl Credential {
    /// Resolve env-var indirection into a concrete key or token.
    pub fn resolve(&self) -> Result<Credential, ParleyError> {
        match self {
            Self::EnvVar(var) => std::env::var(var)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(Credential::ApiKey)
                .ok_or_else(|| {
                    ParleyError::Authentication(format!("Environment variable {var} not set"))
                }),
            other => Ok(other.clone()),
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Self::BearerToken(_))
    }

    /// The secret string, for header construction.
    pub fn secret(&self) -> &str {
        match self {
            Self::ApiKey(value) | Self::BearerToken(value) | Self::EnvVar(value) => value,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
            Self::BearerToken(_) => f.write_str("BearerToken(..)"),
            Self::EnvVar(var) => f.debug_tuple("EnvVar").field(var).finish(),
        }
    }
}

/// Delegated token acquisition (e.g. an identity broker or a config service).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<String, ParleyError>;
}

/// Resolves the credential for each connect attempt.
///
/// A configured token provider is consulted on every call; when it fails the
/// last token it produced is reused. A static API key is the fallback.
#[derive(Clone, Default)]
pub struct CredentialResolver {
    api_key: Option<Credential>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    last_known: Arc<Mutex<Option<Credential>>>,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("api_key", &self.api_key)
            .field("token_provider", &self.token_provider.as_ref().map(|_| ".."))
            .finish()
    }
}

impl CredentialResolver {
    pub fn new(api_key: Option<Credential>, token_provider: Option<Arc<dyn TokenProvider>>) -> Self {
        Self {
            api_key,
            token_provider,
            last_known: Arc::new(Mutex::new(None)),
        }
    }

    /// True when neither a key nor a token provider was supplied.
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.token_provider.is_none()
    }

    pub async fn resolve(&self) -> Result<Credential, ParleyError> {
        if let Some(provider) = &self.token_provider {
            match provider.fetch_token().await {
                Ok(token) if !token.trim().is_empty() => {
                    let credential = Credential::BearerToken(token);
                    *self.last_known.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(credential.clone());
                    return Ok(credential);
                }
                Ok(_) => tracing::warn!("token provider returned an empty token"),
                Err(error) => tracing::warn!(error = %error, "token refresh failed"),
            }
            let cached = self
                .last_known
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(credential) = cached {
                tracing::debug!("reusing last known token");
                return Ok(credential);
            }
        }

        match &self.api_key {
            Some(key) => key.resolve(),
            None => Err(ParleyError::Authentication(
                "No API key or token available".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for FlakyProvider {
        async fn fetch_token(&self) -> Result<String, ParleyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok("token-1".into())
            } else {
                Err(ParleyError::Transport("broker offline".into()))
            }
        }
    }

    #[tokio::test]
    async fn falls_back_to_last_known_token_when_provider_fails() {
        let resolver = CredentialResolver::new(
            None,
            Some(Arc::new(FlakyProvider {
                calls: AtomicUsize::new(0),
            })),
        );

        let first = resolver.resolve().await.unwrap();
        let second = resolver.resolve().await.unwrap();
        assert_eq!(first, Credential::BearerToken("token-1".into()));
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn provider_failure_without_history_uses_api_key() {
        let resolver = CredentialResolver::new(
            Some(Credential::ApiKey("key".into())),
            Some(Arc::new(FlakyProvider {
                calls: AtomicUsize::new(1),
            })),
        );
        assert_eq!(
            resolver.resolve().await.unwrap(),
            Credential::ApiKey("key".into())
        );
    }

    #[tokio::test]
    async fn empty_resolver_is_an_auth_error() {
        let resolver = CredentialResolver::default();
        assert!(resolver.is_empty());
        assert!(matches!(
            resolver.resolve().await,
            Err(ParleyError::Authentication(_))
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", Credential::ApiKey("super-secret".into()));
        assert!(!rendered.contains("super-secret"));
    }
}
