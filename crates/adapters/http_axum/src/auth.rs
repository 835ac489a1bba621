//! Token authentication and role checks.
//!
//! Callers present `Authorization: Bearer <token>` or `X-API-Key: <key>`.
//! The token is looked up in a [`TokenTable`]; an empty table disables
//! authentication and every caller is treated as [`Role::Admin`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use tankhub_domain::error::AuthError;
use tankhub_domain::role::Role;

use crate::error::ApiError;

const API_KEY_HEADER: &str = "x-api-key";

/// Static mapping of credentials to roles.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Role>,
}

impl TokenTable {
    #[must_use]
    pub fn new(tokens: HashMap<String, Role>) -> Self {
        Self { tokens }
    }

    /// Whether authentication is enforced at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Resolve the caller's role from request headers.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] when authentication is enabled and
    /// no known token was presented.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Role, AuthError> {
        if !self.is_enabled() {
            return Ok(Role::Admin);
        }
        presented_token(headers)
            .and_then(|token| self.tokens.get(token).copied())
            .ok_or(AuthError::Unauthorized)
    }
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    })
}

/// Role of the authenticated caller, extracted from the request.
///
/// Only mutating handlers extract it; reads stay open. Extraction
/// authenticates, then handlers call [`Caller::require`] with the role the
/// mutation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Role);

impl Caller {
    /// Check the caller may perform an action requiring `role`.
    ///
    /// # Errors
    ///
    /// Returns a `Forbidden` [`ApiError`] when the caller ranks lower.
    pub fn require(self, role: Role) -> Result<(), ApiError> {
        self.0.require(role).map_err(ApiError::from)
    }
}

impl<St> FromRequestParts<St> for Caller
where
    Arc<TokenTable>: FromRef<St>,
    St: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let tokens = Arc::<TokenTable>::from_ref(state);
        let role = tokens.authenticate(&parts.headers)?;
        Ok(Self(role))
    }
}
