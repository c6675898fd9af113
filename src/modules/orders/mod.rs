pub mod dispatch;
pub mod error;
pub mod models;
pub mod placement;
pub mod reservation;
pub mod status;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use bookstore_db::DbError;
use bookstore_http::{AppError, Validated};
use bookstore_kernel::{InitCtx, Module};
use serde_json::{json, Value};

use crate::context::{AdminUser, CurrentUser, SharedContext};
use crate::modules::books::models::{BookId, BookSummary};
use crate::modules::users::models::UserId;
use models::{LineItemView, Order, OrderView, PlaceOrderRequest, UpdateStatusRequest};
use status::StatusChange;

pub struct OrdersModule {
    ctx: SharedContext,
}

impl OrdersModule {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Module for OrdersModule {
    fn name(&self) -> &'static str {
        "order"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            max_commit_retries = ctx.settings.database.max_commit_retries,
            "orders module initialized"
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let pending = self.ctx.effects.in_flight();
        if pending > 0 {
            tracing::info!(pending, "waiting for order side effects to finish");
        }
        self.ctx.effects.drain().await;
        tracing::info!(module = self.name(), "orders module stopped");
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(order_history).post(place_order))
            .route("/{order_id}/status", patch(update_status))
            .with_state(self.ctx.clone())
    }

    fn openapi(&self) -> Option<Value> {
        let error = json!({
            "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } }
        });
        Some(json!({
            "paths": {
                "/": {
                    "post": {
                        "summary": "Place an order",
                        "description": "Reserves stock for every line item and records the order atomically.",
                        "tags": ["Orders"],
                        "security": [{ "bearerAuth": [] }],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/PlaceOrder" }
                                }
                            }
                        },
                        "responses": {
                            "201": {
                                "description": "Order created",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": {
                                                "message": { "type": "string" },
                                                "order": { "$ref": "#/components/schemas/Order" }
                                            }
                                        }
                                    }
                                }
                            },
                            "400": { "description": "Invalid order or insufficient stock", "content": error.clone() },
                            "401": { "description": "Missing or invalid token", "content": error.clone() },
                            "404": { "description": "A book does not exist", "content": error.clone() },
                            "409": { "description": "Store conflict", "content": error.clone() }
                        }
                    },
                    "get": {
                        "summary": "Order history of the caller, newest first",
                        "tags": ["Orders"],
                        "security": [{ "bearerAuth": [] }],
                        "responses": {
                            "200": { "description": "Orders with resolved books" },
                            "401": { "description": "Missing or invalid token", "content": error.clone() }
                        }
                    }
                },
                "/{order_id}/status": {
                    "patch": {
                        "summary": "Change an order's status",
                        "tags": ["Orders"],
                        "security": [{ "bearerAuth": [] }],
                        "parameters": [{
                            "name": "order_id", "in": "path", "required": true,
                            "schema": { "type": "string", "format": "uuid" }
                        }],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/UpdateOrderStatus" }
                                }
                            }
                        },
                        "responses": {
                            "200": { "description": "Order after the update" },
                            "400": { "description": "Unknown status or malformed id", "content": error.clone() },
                            "401": { "description": "Missing or invalid token", "content": error.clone() },
                            "403": { "description": "Caller is not an administrator", "content": error.clone() },
                            "404": { "description": "Order not found", "content": error }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "PlaceOrder": {
                        "type": "object",
                        "properties": {
                            "books": {
                                "type": "array",
                                "minItems": 1,
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "book": { "type": "string", "format": "uuid" },
                                        "quantity": { "type": "integer", "minimum": 1 }
                                    },
                                    "required": ["book", "quantity"]
                                }
                            }
                        },
                        "required": ["books"]
                    },
                    "UpdateOrderStatus": {
                        "type": "object",
                        "properties": {
                            "status": { "type": "string", "enum": ["pending", "completed", "canceled"] }
                        },
                        "required": ["status"]
                    },
                    "Order": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "user": { "type": "string", "format": "uuid" },
                            "books": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "book": { "type": "string", "format": "uuid" },
                                        "quantity": { "type": "integer" }
                                    }
                                }
                            },
                            "totalPrice": { "type": "number" },
                            "status": { "type": "string", "enum": ["pending", "completed", "canceled"] },
                            "createdAt": { "type": "string", "format": "date-time" },
                            "updatedAt": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "user", "books", "totalPrice", "status", "createdAt", "updatedAt"]
                    }
                }
            }
        }))
    }
}

async fn place_order(
    State(ctx): State<SharedContext>,
    CurrentUser(principal): CurrentUser,
    Validated(request): Validated<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let order = placement::place_order(&ctx, UserId(principal.user_id), &request.books)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Order created successfully", "order": order })),
    ))
}

async fn order_history(
    State(ctx): State<SharedContext>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<Value>, AppError> {
    let user = UserId(principal.user_id);
    let mut orders = ctx.orders.find(|order| order.user == user)?;
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let mut books: HashMap<BookId, Option<BookSummary>> = HashMap::new();
    let orders = orders
        .into_iter()
        .map(|order| resolve(&ctx, order, &mut books))
        .collect::<Result<Vec<OrderView>, DbError>>()?;

    Ok(Json(json!({ "message": "Orders retrieved successfully", "orders": orders })))
}

/// Embed a summary of each ordered book. Books deleted since show as `null`.
fn resolve(
    ctx: &SharedContext,
    order: Order,
    cache: &mut HashMap<BookId, Option<BookSummary>>,
) -> Result<OrderView, DbError> {
    let mut books = Vec::with_capacity(order.books.len());
    for item in &order.books {
        let book = match cache.get(&item.book) {
            Some(summary) => summary.clone(),
            None => {
                let summary = ctx.books.get(&item.book)?.as_ref().map(BookSummary::from);
                cache.insert(item.book, summary.clone());
                summary
            }
        };
        books.push(LineItemView {
            book,
            quantity: item.quantity,
        });
    }

    Ok(OrderView {
        id: order.id,
        user: order.user,
        books,
        total_price: order.total_price,
        status: order.status,
        created_at: order.created_at,
        updated_at: order.updated_at,
    })
}

async fn update_status(
    State(ctx): State<SharedContext>,
    AdminUser(admin): AdminUser,
    Path(order_id): Path<String>,
    Validated(request): Validated<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let change = status::update_status(&ctx, &admin, &order_id, &request.status)?;
    let message = match &change {
        StatusChange::Unchanged(_) => "Order status unchanged",
        StatusChange::Changed(_) => "Order status updated successfully",
    };
    Ok(Json(json!({ "message": message, "order": change.into_order() })))
}

pub fn create_module(ctx: SharedContext) -> Arc<dyn Module> {
    Arc::new(OrdersModule::new(ctx))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use bookstore_authz::Role;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[tokio::test]
    async fn place_and_list_orders_over_http() {
        let app = TestApp::new();
        let reader = app.seed_user("reader", Role::User);
        let dune = app.seed_book("Dune", Decimal::new(1250, 2), 5);
        let body = json!({
            "books": [{ "book": dune.id.to_string(), "quantity": 3, "price": 0.01 }]
        });

        let (status, created) = app
            .call("POST", "/api/order", Some(&reader.api_token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["message"], "Order created successfully");
        assert_eq!(created["order"]["status"], "pending");
        assert_eq!(created["order"]["totalPrice"], json!(37.5));

        let (status, history) = app.call("GET", "/api/order", Some(&reader.api_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["message"], "Orders retrieved successfully");
        let orders = history["orders"].as_array().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["books"][0]["book"]["title"], "Dune");
        assert_eq!(orders[0]["books"][0]["quantity"], 3);
    }

    #[tokio::test]
    async fn placement_errors_over_http() {
        let app = TestApp::new();
        let reader = app.seed_user("reader", Role::User);
        let dune = app.seed_book("Dune", Decimal::new(1000, 2), 2);

        let (status, _) = app
            .call("POST", "/api/order", None, Some(json!({ "books": [] })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, error) = app
            .call("POST", "/api/order", Some(&reader.api_token), Some(json!({ "books": [] })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["message"], "Order must contain at least one book");

        let (status, error) = app
            .call(
                "POST",
                "/api/order",
                Some(&reader.api_token),
                Some(json!({ "books": [{ "book": "abc", "quantity": 1 }] })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["message"], "Invalid book ID: 'abc'.");

        let (status, error) = app
            .call(
                "POST",
                "/api/order",
                Some(&reader.api_token),
                Some(json!({ "books": [{ "book": dune.id.to_string(), "quantity": 3 }] })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["code"], "insufficient_stock");
        assert_eq!(error["error"]["details"][0]["available"], 2);
    }

    #[tokio::test]
    async fn status_updates_require_an_admin() {
        let app = TestApp::new();
        let admin = app.seed_user("root", Role::Admin);
        let reader = app.seed_user("reader", Role::User);
        let dune = app.seed_book("Dune", Decimal::new(1000, 2), 2);
        let body = json!({ "books": [{ "book": dune.id.to_string(), "quantity": 1 }] });
        let (_, created) = app
            .call("POST", "/api/order", Some(&reader.api_token), Some(body))
            .await;
        let uri = format!("/api/order/{}/status", created["order"]["id"].as_str().unwrap());

        let (status, error) = app
            .call("PATCH", &uri, Some(&reader.api_token), Some(json!({ "status": "completed" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error["error"]["message"], "Access denied. Admins only");

        let (status, updated) = app
            .call("PATCH", &uri, Some(&admin.api_token), Some(json!({ "status": "completed" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["order"]["status"], "completed");

        let (status, same) = app
            .call("PATCH", &uri, Some(&admin.api_token), Some(json!({ "status": "completed" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(same["message"], "Order status unchanged");

        let (status, reopened) = app
            .call("PATCH", &uri, Some(&admin.api_token), Some(json!({ "status": "pending" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reopened["message"], "Order status updated successfully");
        assert_eq!(reopened["order"]["status"], "pending");

        let (status, _) = app
            .call("PATCH", &uri, Some(&admin.api_token), Some(json!({ "status": "lost" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
