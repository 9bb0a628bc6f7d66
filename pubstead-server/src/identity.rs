//! Resolving the caller of a write request to an uploader email.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};

use crate::error::{AppError, RegistryError, RegistryResult};
use crate::state::AppState;

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Email of the caller, or [`RegistryError::Unauthorized`].
    async fn resolve(&self, headers: &HeaderMap) -> RegistryResult<String>;
}

/// Every request acts as one configured uploader.
pub struct StaticIdentity {
    email: String,
}

impl StaticIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn resolve(&self, _headers: &HeaderMap) -> RegistryResult<String> {
        Ok(self.email.clone())
    }
}

/// `Authorization: Bearer <token>` looked up in a fixed token table.
pub struct TokenIdentity {
    tokens: BTreeMap<String, String>,
}

impl TokenIdentity {
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        Self { tokens }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl IdentityResolver for TokenIdentity {
    async fn resolve(&self, headers: &HeaderMap) -> RegistryResult<String> {
        let token = bearer_token(headers)
            .ok_or_else(|| RegistryError::Unauthorized("missing bearer token".to_string()))?;
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| RegistryError::Unauthorized("unknown token".to_string()))
    }
}

/// Pick the resolver the security settings ask for.
pub fn from_config(security: &crate::config::SecurityConfig) -> Arc<dyn IdentityResolver> {
    if security.tokens.is_empty() {
        Arc::new(StaticIdentity::new(security.default_uploader.clone()))
    } else {
        Arc::new(TokenIdentity::new(security.tokens.clone()))
    }
}

/// Extractor yielding the resolved caller email.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let email = state.identity.resolve(&parts.headers).await?;
        Ok(Caller(email))
    }
}
