pub mod models;
pub mod service;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use bookstore_http::AppError;
use bookstore_kernel::{InitCtx, Module};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::context::{CurrentUser, SharedContext};
use crate::modules::users::models::UserId;
use models::{ListQuery, Notification, NotificationPage};
use service::NotificationService;

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct NotificationsModule {
    ctx: SharedContext,
    sweeper: Mutex<Option<Sweeper>>,
}

impl NotificationsModule {
    pub fn new(ctx: SharedContext) -> Self {
        Self {
            ctx,
            sweeper: Mutex::new(None),
        }
    }
}

/// Periodically delete read notifications older than `retention_days`.
async fn run_retention_sweep(
    service: NotificationService,
    retention_days: i64,
    every: StdDuration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let cutoff = crate::utils::now() - time::Duration::days(retention_days);
                match service.purge_read_older_than(cutoff) {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::info!(removed, retention_days, "old read notifications purged");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "notification retention sweep failed");
                    }
                }
            }
        }
    }
    tracing::debug!("notification retention sweep stopped");
}

#[async_trait]
impl Module for NotificationsModule {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn start(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let settings = &ctx.settings.notifications;
        if settings.retention_days < 1 || settings.sweep_interval_secs == 0 {
            anyhow::bail!(
                "notification retention needs positive retention_days and sweep_interval_secs"
            );
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_retention_sweep(
            self.ctx.notifications.clone(),
            settings.retention_days,
            StdDuration::from_secs(settings.sweep_interval_secs),
            cancel.clone(),
        ));
        if let Some(previous) = self.sweeper.lock().replace(Sweeper { cancel, handle }) {
            previous.cancel.cancel();
        }

        tracing::info!(
            module = self.name(),
            retention_days = settings.retention_days,
            every_secs = settings.sweep_interval_secs,
            "notification retention sweep started"
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let sweeper = self.sweeper.lock().take();
        if let Some(Sweeper { cancel, handle }) = sweeper {
            cancel.cancel();
            handle.await?;
        }
        tracing::info!(module = self.name(), "notifications module stopped");
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(list_notifications))
            .route("/unread-count", get(unread_count))
            .route("/mark-all-read", patch(mark_all_read))
            .route("/{id}/mark-read", patch(mark_read))
            .with_state(self.ctx.clone())
    }

    fn openapi(&self) -> Option<Value> {
        let secured = json!([{ "bearerAuth": [] }]);
        let error = json!({
            "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } }
        });
        let query = |name: &str, schema: Value| {
            json!({ "name": name, "in": "query", "required": false, "schema": schema })
        };
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List the caller's notifications, newest first",
                        "tags": ["Notifications"],
                        "security": secured.clone(),
                        "parameters": [
                            query("page", json!({ "type": "integer", "minimum": 1, "default": 1 })),
                            query("limit", json!({ "type": "integer", "minimum": 1, "maximum": 50, "default": 10 })),
                            query("type", json!({ "type": "string", "enum": ["order_status", "review", "system"] })),
                            query("isRead", json!({ "type": "boolean" }))
                        ],
                        "responses": {
                            "200": { "description": "A page of notifications" },
                            "400": { "description": "Invalid query", "content": error.clone() },
                            "401": { "description": "Missing or invalid token", "content": error.clone() }
                        }
                    }
                },
                "/unread-count": {
                    "get": {
                        "summary": "Count unread notifications",
                        "tags": ["Notifications"],
                        "security": secured.clone(),
                        "responses": {
                            "200": { "description": "`{unreadCount}`" },
                            "401": { "description": "Missing or invalid token", "content": error.clone() }
                        }
                    }
                },
                "/mark-all-read": {
                    "patch": {
                        "summary": "Mark every notification of the caller as read",
                        "tags": ["Notifications"],
                        "security": secured.clone(),
                        "responses": {
                            "200": { "description": "Done" },
                            "401": { "description": "Missing or invalid token", "content": error.clone() }
                        }
                    }
                },
                "/{id}/mark-read": {
                    "patch": {
                        "summary": "Mark one notification as read",
                        "tags": ["Notifications"],
                        "security": secured,
                        "parameters": [{
                            "name": "id", "in": "path", "required": true,
                            "schema": { "type": "string", "format": "uuid" }
                        }],
                        "responses": {
                            "200": {
                                "description": "The updated notification",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Notification" }
                                    }
                                }
                            },
                            "404": { "description": "Not addressed to the caller", "content": error }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Notification": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "recipients": { "type": "array", "items": { "type": "string", "format": "uuid" } },
                            "type": { "type": "string", "enum": ["order_status", "review", "system"] },
                            "title": { "type": "string" },
                            "message": { "type": "string" },
                            "isRead": { "type": "boolean" },
                            "relatedItem": { "type": "string", "format": "uuid" },
                            "itemModel": { "type": "string", "enum": ["Order", "Books", "Review", "User"] },
                            "createdAt": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "recipients", "type", "title", "message", "isRead", "createdAt"]
                    }
                }
            }
        }))
    }
}

fn caller(CurrentUser(principal): &CurrentUser) -> UserId {
    UserId(principal.user_id)
}

async fn list_notifications(
    State(ctx): State<SharedContext>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<NotificationPage>, AppError> {
    let filter = query.parse()?;
    Ok(Json(ctx.notifications.list(caller(&user), filter)?))
}

async fn unread_count(
    State(ctx): State<SharedContext>,
    user: CurrentUser,
) -> Result<Json<Value>, AppError> {
    let count = ctx.notifications.unread_count(caller(&user))?;
    Ok(Json(json!({ "unreadCount": count })))
}

async fn mark_read(
    State(ctx): State<SharedContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(ctx.notifications.mark_read(caller(&user), &id)?))
}

async fn mark_all_read(
    State(ctx): State<SharedContext>,
    user: CurrentUser,
) -> Result<Json<Value>, AppError> {
    let updated = ctx.notifications.mark_all_read(caller(&user))?;
    tracing::debug!(updated, "notifications marked as read");
    Ok(Json(json!({ "message": "All notifications marked as read" })))
}

pub fn create_module(ctx: SharedContext) -> Arc<dyn Module> {
    Arc::new(NotificationsModule::new(ctx))
}
