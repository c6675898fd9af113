//! Embedded document store for the bookstore backend, persisted with redb.
//!
//! Every [`Document`] type owns one redb table keyed by its id, holding the
//! JSON encoding of a [`Versioned`] row. Multi-table atomicity comes from
//! [`Transaction`], a thin layer over one redb write transaction: reads see
//! the transaction's own writes, and an update carrying a version other than
//! the stored one refuses the whole commit with [`DbError::Conflict`].
//!
//! redb admits one writer at a time per database, so a transaction holds the
//! write lock from [`Database::begin`] until commit or rollback. Readers use
//! snapshots and never wait on it.

mod database;
mod error;
mod table;
mod transaction;

pub use database::{Database, DatabaseOptions};
pub use error::{DbError, DbResult};
pub use table::{Document, Table, Versioned};
pub use transaction::Transaction;
