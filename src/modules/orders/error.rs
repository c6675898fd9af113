use bookstore_db::DbError;
use bookstore_http::AppError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order must contain at least one book")]
    EmptyOrder,

    #[error("Quantity must be a positive integer")]
    InvalidQuantity { book: String },

    #[error("Invalid {kind} ID: '{raw}'.")]
    InvalidReference { kind: &'static str, raw: String },

    #[error("Book not found: {0}")]
    BookNotFound(String),

    #[error("Order not found")]
    OrderNotFound,

    #[error("Sorry, only {available} copies of \"{title}\" are available.")]
    InsufficientStock { available: u32, title: String },

    #[error("Invalid status '{0}'. Must be one of: pending, completed, canceled")]
    InvalidStatus(String),

    #[error("Order total is too large")]
    TotalOverflow,

    #[error(transparent)]
    Store(#[from] DbError),
}

impl OrderError {
    pub fn invalid_book(raw: &str) -> Self {
        OrderError::InvalidReference {
            kind: "book",
            raw: raw.to_string(),
        }
    }

    pub fn invalid_order(raw: &str) -> Self {
        OrderError::InvalidReference {
            kind: "order",
            raw: raw.to_string(),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::EmptyOrder => AppError::validation(
                vec![json!({ "field": "books", "message": message })],
                message,
            ),
            OrderError::InvalidQuantity { book } => AppError::validation(
                vec![json!({ "field": "quantity", "book": book, "message": message })],
                message,
            ),
            OrderError::InvalidReference { .. } => {
                AppError::bad_request(message).with_code("invalid_reference")
            }
            OrderError::BookNotFound(_) => AppError::not_found(message).with_code("book_not_found"),
            OrderError::OrderNotFound => AppError::not_found(message).with_code("order_not_found"),
            OrderError::InsufficientStock { available, title } => AppError::bad_request(message)
                .with_code("insufficient_stock")
                .with_details(vec![json!({ "title": title, "available": available })]),
            OrderError::InvalidStatus(_) => {
                AppError::bad_request(message).with_code("invalid_status")
            }
            OrderError::TotalOverflow => AppError::bad_request(message).with_code("total_overflow"),
            OrderError::Store(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (OrderError::EmptyOrder, StatusCode::BAD_REQUEST),
            (OrderError::invalid_book("abc"), StatusCode::BAD_REQUEST),
            (OrderError::BookNotFound("b".into()), StatusCode::NOT_FOUND),
            (OrderError::OrderNotFound, StatusCode::NOT_FOUND),
            (
                OrderError::InsufficientStock { available: 2, title: "Dune".into() },
                StatusCode::BAD_REQUEST,
            ),
            (OrderError::InvalidStatus("shipped".into()), StatusCode::BAD_REQUEST),
            (OrderError::TotalOverflow, StatusCode::BAD_REQUEST),
            (
                OrderError::Store(DbError::Conflict { table: "book", id: "1".into() }),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn messages_name_the_offending_input() {
        assert_eq!(
            OrderError::invalid_book("xyz").to_string(),
            "Invalid book ID: 'xyz'."
        );
        assert_eq!(
            OrderError::InsufficientStock { available: 2, title: "Dune".into() }.to_string(),
            "Sorry, only 2 copies of \"Dune\" are available."
        );
    }
}
