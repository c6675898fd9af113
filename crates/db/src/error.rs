use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum DbError {
    /// Another writer changed the document after it was read.
    #[error("write conflict on {table}:{id}")]
    Conflict { table: &'static str, id: String },

    #[error("duplicate key {table}:{id}")]
    Duplicate { table: &'static str, id: String },

    #[error("transaction {tx} expired after {age_ms}ms")]
    TransactionExpired { tx: u64, age_ms: u128 },

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("corrupt row in {table}: {source}")]
    Decode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode row for {table}: {source}")]
    Encode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Whether replaying the transaction from the start may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Conflict { .. })
    }
}

/// Result type for store operations
pub type DbResult<T> = Result<T, DbError>;
