pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, routing::get, Json, Router};
use bookstore_authz::{Authenticator, Principal, Role};
use bookstore_db::{DbResult, Table};
use bookstore_http::AppError;
use bookstore_kernel::{settings::AdminSeed, InitCtx, Module};
use serde_json::json;

use crate::context::{CurrentUser, SharedContext};
use models::{Profile, User, UserId};

/// Resolves API tokens against the user table.
#[derive(Clone)]
pub struct UserDirectory {
    users: Table<User>,
}

impl UserDirectory {
    pub fn new(users: Table<User>) -> Self {
        Self { users }
    }

    /// Every account holding the administrator role.
    pub fn admins(&self) -> DbResult<Vec<User>> {
        self.users.find(User::is_admin)
    }

    /// Create the configured administrator accounts that do not exist yet.
    /// Returns how many were created.
    pub fn ensure_default_admins(&self, seeds: &[AdminSeed]) -> anyhow::Result<usize> {
        let mut created = 0;
        for seed in seeds {
            let email = seed.email.trim().to_lowercase();
            if email.is_empty() || seed.token.trim().is_empty() {
                anyhow::bail!("default admin entries need both an email and a token");
            }
            if self.users.count(|user| user.email == email)? > 0 {
                tracing::debug!(%email, "default admin already present");
                continue;
            }

            let username = seed
                .username
                .clone()
                .unwrap_or_else(|| email.split('@').next().unwrap_or("admin").to_string());
            self.users
                .insert(User::new(username, email.clone(), Role::Admin, seed.token.trim()))?;
            tracing::info!(%email, "default admin created");
            created += 1;
        }
        Ok(created)
    }
}

#[async_trait]
impl Authenticator for UserDirectory {
    async fn authenticate(&self, token: &str) -> Option<Principal> {
        match self.users.find(|user| user.api_token == token) {
            Ok(found) => found.first().map(User::principal),
            Err(err) => {
                tracing::error!(error = %err, "token lookup failed");
                None
            }
        }
    }
}

pub struct UsersModule {
    ctx: SharedContext,
}

impl UsersModule {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Module for UsersModule {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let created = UserDirectory::new(self.ctx.users.clone())
            .ensure_default_admins(&ctx.settings.auth.default_admins)?;
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            admins_created = created,
            "users module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/me", get(me))
            .with_state(self.ctx.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/me": {
                    "get": {
                        "summary": "Profile of the authenticated caller",
                        "tags": ["Users"],
                        "security": [{ "bearerAuth": [] }],
                        "responses": {
                            "200": {
                                "description": "Caller profile",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/User" }
                                    }
                                }
                            },
                            "401": {
                                "description": "Missing or invalid token",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "User": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "username": { "type": "string" },
                            "email": { "type": "string", "format": "email" },
                            "role": { "type": "string", "enum": ["User", "Admin"] },
                            "createdAt": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "username", "email", "role", "createdAt"]
                    }
                }
            }
        }))
    }
}

async fn me(
    State(ctx): State<SharedContext>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<Profile>, AppError> {
    ctx.users
        .get(&UserId(principal.user_id))?
        .map(|user| Json(Profile::from(user)))
        .ok_or_else(|| AppError::not_found("User not found").with_code("user_not_found"))
}

pub fn create_module(ctx: SharedContext) -> Arc<dyn Module> {
    Arc::new(UsersModule::new(ctx))
}
