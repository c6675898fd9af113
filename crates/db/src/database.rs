use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redb::backends::InMemoryBackend;

use crate::error::{DbError, DbResult};
use crate::table::{self, Document, Table, SEQUENCES};
use crate::transaction::Transaction;

#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Database file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Transactions older than this are refused at commit.
    pub transaction_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            path: None,
            transaction_timeout: Duration::from_secs(5),
        }
    }
}

struct DatabaseInner {
    redb: Arc<redb::Database>,
    options: DatabaseOptions,
    next_tx: AtomicU64,
}

/// Shared handle to the store. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open (or create) the database file named by `options.path`, or an
    /// in-memory database when no path is set.
    pub fn open(options: DatabaseOptions) -> DbResult<Self> {
        let redb = match &options.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                redb::Database::create(path)?
            }
            None => redb::Database::builder().create_with_backend(InMemoryBackend::new())?,
        };

        tracing::info!(
            path = options
                .path
                .as_ref()
                .map_or_else(|| "<memory>".to_string(), |p| p.display().to_string()),
            transaction_timeout_ms = options.transaction_timeout.as_millis() as u64,
            "document store opened"
        );

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                redb: Arc::new(redb),
                options,
                next_tx: AtomicU64::new(0),
            }),
        })
    }

    /// An empty in-memory database with default options.
    pub fn in_memory() -> DbResult<Self> {
        Self::open(DatabaseOptions::default())
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.inner.options
    }

    /// The table storing documents of type `T`, created if the file does not
    /// have it yet.
    pub fn table<T: Document>(&self) -> DbResult<Table<T>> {
        let txn = self.inner.redb.begin_write()?;
        drop(txn.open_table(table::definition::<T>())?);
        drop(txn.open_table(SEQUENCES)?);
        txn.commit()?;
        tracing::debug!(table = T::TABLE, "table ready");
        Ok(Table::new(self.inner.redb.clone()))
    }

    /// Open a transaction. Nothing it writes is visible until
    /// [`Transaction::commit`]. Blocks while another transaction is open.
    pub fn begin(&self) -> DbResult<Transaction> {
        let id = self.inner.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        let txn = self.inner.redb.begin_write()?;
        Ok(Transaction::new(
            id,
            txn,
            self.inner.redb.clone(),
            self.inner.options.transaction_timeout,
        ))
    }

    /// Run `body` inside a transaction and commit it, replaying the whole body
    /// when the commit is refused with a transient error. Errors returned by
    /// `body` roll the transaction back and are returned unchanged.
    pub fn run_transaction<R, E, F>(&self, max_retries: u32, mut body: F) -> Result<R, E>
    where
        F: FnMut(&mut Transaction) -> Result<R, E>,
        E: From<DbError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.begin()?;
            let output = match body(&mut tx) {
                Ok(output) => output,
                Err(err) => {
                    tx.rollback();
                    return Err(err);
                }
            };

            match tx.commit() {
                Ok(()) => return Ok(output),
                Err(err) if err.is_transient() && attempt <= max_retries => {
                    tracing::warn!(attempt, error = %err, "transaction conflicted, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::Item;
    use crate::DbResult;

    #[test]
    fn run_transaction_replays_after_conflict() {
        let db = Database::in_memory().unwrap();
        let items = db.table::<Item>().unwrap();
        items.insert(Item { id: 1, qty: 5 }).unwrap();
        let stale = items.get_versioned(&1).unwrap().unwrap();
        items.update(&1, |item| item.qty -= 1).unwrap();

        let mut attempts = 0;
        let result: DbResult<i64> = db.run_transaction(3, |tx| {
            attempts += 1;
            // The first attempt works from a copy read before the competing write.
            let mut item = if attempts == 1 {
                stale.clone()
            } else {
                tx.get(&items, &1)?.unwrap()
            };
            item.qty -= 2;
            let left = item.qty;
            tx.update(&items, item)?;
            Ok(left)
        });

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts, 2);
        assert_eq!(items.get(&1).unwrap().unwrap().qty, 2);
    }

    #[test]
    fn run_transaction_gives_up_after_max_retries() {
        let db = Database::in_memory().unwrap();
        let items = db.table::<Item>().unwrap();
        items.insert(Item { id: 1, qty: 5 }).unwrap();
        let stale = items.get_versioned(&1).unwrap().unwrap();
        items.update(&1, |item| item.qty += 100).unwrap();

        let mut attempts = 0;
        let result: DbResult<()> = db.run_transaction(1, |tx| {
            attempts += 1;
            let mut item = stale.clone();
            item.qty = 0;
            tx.update(&items, item)
        });

        assert!(matches!(result, Err(DbError::Conflict { .. })));
        assert_eq!(attempts, 2);
        assert_eq!(items.get(&1).unwrap().unwrap().qty, 105);
    }

    #[test]
    fn body_error_rolls_back() {
        let db = Database::in_memory().unwrap();
        let items = db.table::<Item>().unwrap();
        items.insert(Item { id: 1, qty: 5 }).unwrap();

        let result: Result<(), DbError> = db.run_transaction(3, |tx| {
            let mut item = tx.get(&items, &1)?.unwrap();
            item.qty = 0;
            tx.update(&items, item)?;
            Err(DbError::Duplicate {
                table: "item",
                id: "1".into(),
            })
        });

        assert!(result.is_err());
        assert_eq!(items.get(&1).unwrap().unwrap().qty, 5);
    }

    #[test]
    fn writers_on_other_threads_wait_for_the_open_transaction() {
        let db = Database::in_memory().unwrap();
        let items = db.table::<Item>().unwrap();
        items.insert(Item { id: 1, qty: 5 }).unwrap();

        let mut tx = db.begin().unwrap();
        let mut item = tx.get(&items, &1).unwrap().unwrap();

        let competing = {
            let items = items.clone();
            std::thread::spawn(move || items.update(&1, |item| item.qty -= 1).unwrap())
        };
        std::thread::sleep(Duration::from_millis(20));

        item.qty -= 2;
        tx.update(&items, item).unwrap();
        tx.commit().unwrap();
        competing.join().unwrap();

        assert_eq!(items.get(&1).unwrap().unwrap().qty, 2);
    }
}
