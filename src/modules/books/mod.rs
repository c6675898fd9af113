pub mod catalog;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bookstore_http::{AppError, Validated};
use bookstore_kernel::{InitCtx, Module};
use serde_json::{json, Value};

use crate::context::{AdminUser, SharedContext};
use models::{Book, CreateBook};

pub struct BooksModule {
    ctx: SharedContext,
}

impl BooksModule {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            books = self.ctx.books.len()?,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(list_books).post(create_book))
            .route("/{id}", get(get_book))
            .with_state(self.ctx.clone())
    }

    fn openapi(&self) -> Option<Value> {
        let error = json!({
            "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } }
        });
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books",
                        "tags": ["Books"],
                        "responses": {
                            "200": {
                                "description": "Catalog in catalog-number order",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Book" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "summary": "Add a book",
                        "tags": ["Books"],
                        "security": [{ "bearerAuth": [] }],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/CreateBook" }
                                }
                            }
                        },
                        "responses": {
                            "201": { "description": "Book created" },
                            "400": { "description": "Invalid book", "content": error.clone() },
                            "401": { "description": "Missing or invalid token", "content": error.clone() },
                            "403": { "description": "Caller is not an administrator", "content": error.clone() }
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a book",
                        "tags": ["Books"],
                        "parameters": [{
                            "name": "id", "in": "path", "required": true,
                            "schema": { "type": "string", "format": "uuid" }
                        }],
                        "responses": {
                            "200": {
                                "description": "The book",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Book" }
                                    }
                                }
                            },
                            "400": { "description": "Malformed id", "content": error.clone() },
                            "404": { "description": "Book not found", "content": error }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "bookId": { "type": "integer" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "price": { "type": "number", "minimum": 0 },
                            "stock": { "type": "integer", "minimum": 0 },
                            "description": { "type": "string" },
                            "image": { "type": "string", "nullable": true },
                            "createdAt": { "type": "string", "format": "date-time" },
                            "updatedAt": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "bookId", "title", "author", "price", "stock", "description"]
                    },
                    "CreateBook": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string", "minLength": 3, "maxLength": 255 },
                            "author": { "type": "string", "minLength": 3, "maxLength": 100 },
                            "price": { "type": "number", "minimum": 0, "maximum": 1000000 },
                            "stock": { "type": "integer", "minimum": 0 },
                            "description": { "type": "string" },
                            "image": { "type": "string" }
                        },
                        "required": ["title", "author", "price", "stock", "description"]
                    }
                }
            }
        }))
    }
}

async fn list_books(State(ctx): State<SharedContext>) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalog::list_books(&ctx.books)?))
}

async fn get_book(
    State(ctx): State<SharedContext>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(catalog::find_book(&ctx.books, &id)?))
}

async fn create_book(
    State(ctx): State<SharedContext>,
    AdminUser(_admin): AdminUser,
    Validated(input): Validated<CreateBook>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let book = catalog::create_book(&ctx.books, input)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Book created successfully", "book": book })),
    ))
}

pub fn create_module(ctx: SharedContext) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(ctx))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use bookstore_authz::Role;
    use serde_json::json;

    fn body() -> serde_json::Value {
        json!({
            "title": "Neuromancer",
            "author": "William Gibson",
            "price": 14.99,
            "stock": 5,
            "description": "Cyberpunk",
        })
    }

    #[tokio::test]
    async fn only_admins_add_books() {
        let app = TestApp::new();
        let admin = app.seed_user("root", Role::Admin);
        let reader = app.seed_user("reader", Role::User);

        let (status, _) = app
            .call("POST", "/api/books", Some(&reader.api_token), Some(body()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) = app
            .call("POST", "/api/books", Some(&admin.api_token), Some(body()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["book"]["title"], "Neuromancer");
        assert_eq!(created["book"]["price"], json!(14.99));

        let id = created["book"]["id"].as_str().unwrap().to_string();
        let (status, fetched) = app.call("GET", &format!("/api/books/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["stock"], 5);

        let (status, listed) = app.call("GET", "/api/books", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_books_are_rejected() {
        let app = TestApp::new();
        let admin = app.seed_user("root", Role::Admin);

        let mut negative = body();
        negative["price"] = json!(-3);
        let (status, error) = app
            .call("POST", "/api/books", Some(&admin.api_token), Some(negative))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["code"], "validation_error");

        let mut huge = body();
        huge["price"] = json!(1e28);
        let (status, error) = app
            .call("POST", "/api/books", Some(&admin.api_token), Some(huge))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["code"], "validation_error");

        let (status, error) = app.call("GET", "/api/books/not-an-id", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["message"], "Invalid book ID: 'not-an-id'.");
    }
}
