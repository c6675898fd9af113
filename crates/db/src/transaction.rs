use std::sync::Arc;
use std::time::{Duration, Instant};

use redb::WriteTransaction;

use crate::error::{DbError, DbResult};
use crate::table::{self, Document, Table, Versioned};

/// A unit of work over one or more tables, backed by one redb write
/// transaction.
///
/// Reads see committed data plus this transaction's own writes. An update
/// whose record is no longer at the version it was read at is not written;
/// the transaction then refuses to commit with [`DbError::Conflict`].
/// Dropping a transaction without committing discards its writes.
pub struct Transaction {
    id: u64,
    started_at: Instant,
    timeout: Duration,
    txn: WriteTransaction,
    db: Arc<redb::Database>,
    writes: usize,
    conflict: Option<DbError>,
}

impl Transaction {
    pub(crate) fn new(
        id: u64,
        txn: WriteTransaction,
        db: Arc<redb::Database>,
        timeout: Duration,
    ) -> Self {
        tracing::trace!(tx = id, "transaction started");
        Self {
            id,
            started_at: Instant::now(),
            timeout,
            txn,
            db,
            writes: 0,
            conflict: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of writes made so far.
    pub fn pending_writes(&self) -> usize {
        self.writes
    }

    fn ensure_alive(&self) -> DbResult<()> {
        let age = self.started_at.elapsed();
        if age >= self.timeout {
            return Err(DbError::TransactionExpired {
                tx: self.id,
                age_ms: age.as_millis(),
            });
        }
        Ok(())
    }

    fn check_table<T: Document>(&self, table: &Table<T>) {
        debug_assert!(
            table.belongs_to(&self.db),
            "table {} used with a transaction of another database",
            T::TABLE
        );
    }

    /// Read a document through the transaction, including this
    /// transaction's own writes.
    pub fn get<T: Document>(
        &self,
        table: &Table<T>,
        id: &T::Id,
    ) -> DbResult<Option<Versioned<T>>> {
        self.ensure_alive()?;
        self.check_table(table);

        let rows = self.txn.open_table(table::definition::<T>())?;
        table::read_row(&rows, &table::key_of::<T>(id))
    }

    /// Replace a document previously read with [`Transaction::get`] or
    /// [`Table::get_versioned`].
    pub fn update<T: Document>(&mut self, table: &Table<T>, record: Versioned<T>) -> DbResult<()> {
        self.ensure_alive()?;
        self.check_table(table);

        let key = table::key_of::<T>(record.id());
        let mut rows = self.txn.open_table(table::definition::<T>())?;
        let current = table::read_row::<T, _>(&rows, &key)?;
        if current.map(|row| row.version) != Some(record.version) {
            tracing::debug!(tx = self.id, table = T::TABLE, id = %key, "stale record");
            self.conflict.get_or_insert(DbError::Conflict { table: T::TABLE, id: key });
            return Ok(());
        }

        table::write_row(
            &mut rows,
            &Versioned {
                version: record.version + 1,
                value: record.value,
            },
        )?;
        self.writes += 1;
        Ok(())
    }

    /// Insert a new document. Fails at once if the key exists.
    pub fn insert<T: Document>(&mut self, table: &Table<T>, value: T) -> DbResult<()> {
        self.ensure_alive()?;
        self.check_table(table);

        let key = table::key_of::<T>(value.id());
        let mut rows = self.txn.open_table(table::definition::<T>())?;
        if table::read_row::<T, _>(&rows, &key)?.is_some() {
            return Err(DbError::Duplicate { table: T::TABLE, id: key });
        }

        table::write_row(&mut rows, &Versioned { version: 1, value })?;
        self.writes += 1;
        Ok(())
    }

    /// Make every write durable at once, or none of them.
    pub fn commit(mut self) -> DbResult<()> {
        let refusal = match self.ensure_alive() {
            Err(expired) => Some(expired),
            Ok(()) => self.conflict.take(),
        };
        if let Some(err) = refusal {
            self.txn.abort()?;
            tracing::debug!(tx = self.id, error = %err, "transaction refused at commit");
            return Err(err);
        }

        self.txn.commit()?;
        tracing::trace!(tx = self.id, writes = self.writes, "transaction committed");
        Ok(())
    }

    /// Discard every write.
    pub fn rollback(self) {
        let (id, discarded) = (self.id, self.writes);
        if let Err(err) = self.txn.abort() {
            tracing::warn!(tx = id, error = %err, "transaction abort failed");
            return;
        }
        tracing::trace!(tx = id, discarded, "transaction rolled back");
    }
}
