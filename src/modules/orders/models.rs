use std::fmt;
use std::str::FromStr;

use bookstore_db::Document;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::modules::books::models::{BookId, BookSummary};
use crate::modules::users::models::UserId;

crate::entity_id!(
    /// Storage key of an order.
    OrderId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

/// One book and how many copies of it were bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub book: BookId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user: UserId,
    pub books: Vec<LineItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    pub status: OrderStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Order {
    /// A freshly placed order, always `pending`.
    pub fn new(user: UserId, books: Vec<LineItem>, total_price: Decimal) -> Self {
        let now = crate::utils::now();
        Self {
            id: OrderId::generate(),
            user,
            books,
            total_price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Document for Order {
    type Id = OrderId;
    const TABLE: &'static str = "order";

    fn id(&self) -> &OrderId {
        &self.id
    }
}

/// Request body of `POST /api/order`. Any price the client sends is ignored.
/// An empty list is rejected by the reservation itself.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    #[validate(nested)]
    pub books: Vec<LineItemRequest>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LineItemRequest {
    /// Raw book reference, parsed during reservation.
    pub book: String,
    #[validate(range(min = 1, message = "Quantity must be a positive integer"))]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// A line item with its book resolved for display. `book` is `None` when the
/// book no longer exists.
#[derive(Debug, Clone, Serialize)]
pub struct LineItemView {
    pub book: Option<BookSummary>,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub user: UserId,
    pub books: Vec<LineItemView>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    pub status: OrderStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
