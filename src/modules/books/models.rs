use bookstore_db::Document;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::{Validate, ValidationError};

crate::entity_id!(
    /// Storage key of a book.
    BookId
);

/// A catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    /// Human-facing catalog number, assigned from the table sequence.
    pub book_id: u64,
    pub title: String,
    pub author: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub stock: u32,
    pub description: String,
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document for Book {
    type Id = BookId;
    const TABLE: &'static str = "book";

    fn id(&self) -> &BookId {
        &self.id
    }
}

/// The part of a book embedded in order views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub id: BookId,
    pub title: String,
    pub author: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            price: book.price,
        }
    }
}

/// Request body for adding a book to the catalog.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 3, max = 255, message = "Title must be between 3 and 255 characters"))]
    pub title: String,
    #[validate(length(min = 3, max = 100, message = "Author must be between 3 and 100 characters"))]
    pub author: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[validate(custom(function = "price_in_range"))]
    pub price: Decimal,
    #[validate(range(min = 0, max = 1_000_000, message = "Stock must be a non-negative integer"))]
    pub stock: i64,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Highest accepted unit price.
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

fn price_in_range(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ValidationError::new("range")
            .with_message("Price must be a positive number".into()));
    }
    if *price > MAX_PRICE {
        return Err(ValidationError::new("range")
            .with_message(format!("Price must not exceed {MAX_PRICE}").into()));
    }
    Ok(())
}
