//! Stock checks and provisional decrements inside an order transaction.

use bookstore_db::{Table, Transaction};
use rust_decimal::Decimal;

use super::error::OrderError;
use super::models::{LineItem, LineItemRequest};
use crate::modules::books::models::{Book, BookId};

/// Outcome of a successful reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub items: Vec<LineItem>,
    pub total_price: Decimal,
}

/// Validate every line item in order and stage its stock decrement on `tx`.
///
/// The total is computed from stored prices only. Stock is read and written
/// inside `tx`, so nothing here is visible to other readers until it commits.
/// The first failing line item aborts the reservation as a whole.
pub fn reserve_stock(
    books: &Table<Book>,
    tx: &mut Transaction,
    lines: &[LineItemRequest],
) -> Result<Reservation, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    let mut items = Vec::with_capacity(lines.len());
    let mut total_price = Decimal::ZERO;

    for line in lines {
        if line.quantity < 1 {
            return Err(OrderError::InvalidQuantity {
                book: line.book.clone(),
            });
        }
        let id: BookId = line
            .book
            .parse()
            .map_err(|_| OrderError::invalid_book(&line.book))?;

        // Reads through the transaction, so a book listed twice sees the
        // decrement staged for its earlier line.
        let mut book = tx
            .get(books, &id)?
            .ok_or_else(|| OrderError::BookNotFound(line.book.clone()))?;

        let quantity = u32::try_from(line.quantity).unwrap_or(u32::MAX);
        if book.stock < quantity {
            return Err(OrderError::InsufficientStock {
                available: book.stock,
                title: book.title.clone(),
            });
        }

        total_price = book
            .price
            .checked_mul(Decimal::from(quantity))
            .and_then(|line_total| total_price.checked_add(line_total))
            .ok_or(OrderError::TotalOverflow)?;
        book.stock -= quantity;
        book.updated_at = crate::utils::now();
        tx.update(books, book)?;

        items.push(LineItem { book: id, quantity });
    }

    Ok(Reservation { items, total_price })
}
