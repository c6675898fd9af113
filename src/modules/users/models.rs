use bookstore_authz::{Principal, Role};
use bookstore_db::Document;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

crate::entity_id!(
    /// Storage key of a user.
    UserId
);

/// A registered account, reduced to what ordering and notifications need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    /// Opaque credential presented as a bearer token. Stored, never
    /// returned by the API.
    pub api_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::generate(),
            username: username.into().to_lowercase(),
            email: email.into(),
            role,
            api_token: api_token.into(),
            created_at: crate::utils::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id.0,
            role: self.role,
        }
    }
}

impl Document for User {
    type Id = UserId;
    const TABLE: &'static str = "user";

    fn id(&self) -> &UserId {
        &self.id
    }
}

/// What `GET /api/users/me` returns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Public part of a user embedded in other payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}
