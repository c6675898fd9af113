//! Authentication hooks and authorization guards.
//!
//! Identity issuance lives elsewhere; this crate only defines what an
//! authenticated caller looks like ([`Principal`]), how a bearer credential
//! is resolved to one ([`Authenticator`]), and the role checks routes apply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Caller role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Please login first")]
    MissingCredentials,

    #[error("Invalid or expired token")]
    InvalidCredentials,

    #[error("Access denied. Admins only")]
    Forbidden,
}

/// Resolves a bearer credential to a caller.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Extract the credential from an `Authorization` header value. Accepts both
/// `Bearer <token>` and a bare token.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let token = match header.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return None,
        None if header.eq_ignore_ascii_case("bearer") => return None,
        None => header,
    };
    (!token.is_empty()).then_some(token)
}

/// Resolve an optional `Authorization` header to a principal.
pub async fn authenticate_header(
    authenticator: &dyn Authenticator,
    header: Option<&str>,
) -> Result<Principal, AuthError> {
    let header = header.ok_or(AuthError::MissingCredentials)?;
    let token = bearer_token(header).ok_or(AuthError::InvalidCredentials)?;
    match authenticator.authenticate(token).await {
        Some(principal) => Ok(principal),
        None => {
            tracing::warn!(target: "bookstore::security", "rejected unknown credential");
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Guard for administrator-only operations.
pub fn require_admin(principal: &Principal) -> Result<(), AuthError> {
    if principal.is_admin() {
        Ok(())
    } else {
        tracing::warn!(
            target: "bookstore::security",
            user_id = %principal.user_id,
            "non-admin attempted an admin operation"
        );
        Err(AuthError::Forbidden)
    }
}
