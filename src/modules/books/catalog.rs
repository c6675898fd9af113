//! Catalog reads and admin inserts.

use bookstore_db::{DbError, Table};
use bookstore_http::AppError;
use thiserror::Error;

use super::models::{Book, BookId, CreateBook};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid book ID: '{0}'.")]
    InvalidReference(String),

    #[error("Book not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] DbError),
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidReference(_) => {
                AppError::bad_request(err.to_string()).with_code("invalid_reference")
            }
            CatalogError::NotFound(_) => {
                AppError::not_found(err.to_string()).with_code("book_not_found")
            }
            CatalogError::Store(db) => db.into(),
        }
    }
}

pub fn parse_book_id(raw: &str) -> Result<BookId, CatalogError> {
    raw.parse()
        .map_err(|_| CatalogError::InvalidReference(raw.to_string()))
}

/// Every book, in catalog-number order.
pub fn list_books(books: &Table<Book>) -> Result<Vec<Book>, CatalogError> {
    let mut all = books.find(|_| true)?;
    all.sort_by_key(|book| book.book_id);
    Ok(all)
}

pub fn find_book(books: &Table<Book>, raw_id: &str) -> Result<Book, CatalogError> {
    let id = parse_book_id(raw_id)?;
    books
        .get(&id)?
        .ok_or_else(|| CatalogError::NotFound(raw_id.to_string()))
}

pub fn create_book(books: &Table<Book>, input: CreateBook) -> Result<Book, CatalogError> {
    let now = crate::utils::now();
    let book = Book {
        id: BookId::generate(),
        book_id: books.next_sequence()?,
        title: input.title.trim().to_string(),
        author: input.author.trim().to_string(),
        price: input.price,
        stock: u32::try_from(input.stock).unwrap_or(0),
        description: input.description.trim().to_string(),
        image: input.image.filter(|image| !image.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };
    books.insert(book.clone())?;
    tracing::info!(
        book_id = book.book_id,
        id = %book.id,
        title = %book.title,
        "book added to catalog"
    );
    Ok(book)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstore_db::Database;
    use rust_decimal::Decimal;

    fn input(title: &str) -> CreateBook {
        CreateBook {
            title: format!("  {title} "),
            author: "Ursula K. Le Guin".into(),
            price: Decimal::new(999, 2),
            stock: 3,
            description: "Classic".into(),
            image: Some(" ".into()),
        }
    }

    #[test]
    fn created_books_get_sequential_catalog_numbers() {
        let books = Database::in_memory().unwrap().table::<Book>().unwrap();

        let first = create_book(&books, input("Earthsea")).unwrap();
        let second = create_book(&books, input("The Dispossessed")).unwrap();

        assert_eq!(first.book_id, 1);
        assert_eq!(second.book_id, 2);
        assert_eq!(first.title, "Earthsea");
        assert!(first.image.is_none());
        let listed: Vec<u64> = list_books(&books).unwrap().iter().map(|b| b.book_id).collect();
        assert_eq!(listed, vec![1, 2]);
    }

    #[test]
    fn lookups_distinguish_malformed_and_missing_ids() {
        let books = Database::in_memory().unwrap().table::<Book>().unwrap();
        let book = create_book(&books, input("Earthsea")).unwrap();

        assert_eq!(find_book(&books, &book.id.to_string()).unwrap().id, book.id);
        assert!(matches!(
            find_book(&books, "abc"),
            Err(CatalogError::InvalidReference(raw)) if raw == "abc"
        ));
        let missing = BookId::generate().to_string();
        assert!(matches!(find_book(&books, &missing), Err(CatalogError::NotFound(_))));
    }
}
