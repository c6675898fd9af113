use std::fmt::{Debug, Display};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use redb::{ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

/// Rows of one document table: id string to JSON-encoded [`Versioned`] row.
pub(crate) type RowDefinition = TableDefinition<'static, &'static str, &'static [u8]>;

/// Auto-increment counters, one per document table.
pub(crate) const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("__sequence");

/// A value that can be stored in a [`Table`].
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Rendered with `Display` to form the storage key.
    type Id: Clone + Eq + Debug + Display + Send + Sync + 'static;

    /// Table name in the database file, logs and errors.
    const TABLE: &'static str;

    fn id(&self) -> &Self::Id;
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Versioned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Versioned<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

pub(crate) fn definition<T: Document>() -> RowDefinition {
    TableDefinition::new(T::TABLE)
}

pub(crate) fn key_of<T: Document>(id: &T::Id) -> String {
    id.to_string()
}

fn decode<T: Document>(bytes: &[u8]) -> DbResult<Versioned<T>> {
    serde_json::from_slice(bytes).map_err(|source| DbError::Decode {
        table: T::TABLE,
        source,
    })
}

pub(crate) fn read_row<T, R>(rows: &R, key: &str) -> DbResult<Option<Versioned<T>>>
where
    T: Document,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match rows.get(key)? {
        Some(bytes) => decode(bytes.value()).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn write_row<T: Document>(
    rows: &mut redb::Table<'_, &'static str, &'static [u8]>,
    row: &Versioned<T>,
) -> DbResult<()> {
    let bytes = serde_json::to_vec(row).map_err(|source| DbError::Encode {
        table: T::TABLE,
        source,
    })?;
    rows.insert(key_of::<T>(row.id()).as_str(), bytes.as_slice())?;
    Ok(())
}

fn scan<T, R>(rows: &R) -> DbResult<Vec<Versioned<T>>>
where
    T: Document,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in rows.iter()? {
        let (_, bytes) = entry?;
        out.push(decode(bytes.value())?);
    }
    Ok(out)
}

/// Handle to one document table. Cheap to clone.
///
/// Each method outside a [`crate::Transaction`] runs in its own redb
/// transaction. Calling a writing method on a thread that holds an open
/// [`crate::Transaction`] waits for that transaction forever.
pub struct Table<T: Document> {
    db: Arc<redb::Database>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Table<T> {
    pub(crate) fn new(db: Arc<redb::Database>) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        T::TABLE
    }

    pub(crate) fn belongs_to(&self, db: &Arc<redb::Database>) -> bool {
        Arc::ptr_eq(&self.db, db)
    }

    fn read<R>(
        &self,
        body: impl FnOnce(&redb::ReadOnlyTable<&'static str, &'static [u8]>) -> DbResult<R>,
    ) -> DbResult<R> {
        let txn = self.db.begin_read()?;
        let rows = txn.open_table(definition::<T>())?;
        body(&rows)
    }

    fn write<R>(
        &self,
        body: impl FnOnce(&mut redb::Table<'_, &'static str, &'static [u8]>) -> DbResult<R>,
    ) -> DbResult<R> {
        let txn = self.db.begin_write()?;
        let output = {
            let mut rows = txn.open_table(definition::<T>())?;
            body(&mut rows)?
        };
        txn.commit()?;
        Ok(output)
    }

    /// Next value of the table's auto-increment sequence, starting at 1.
    /// The counter survives restarts.
    pub fn next_sequence(&self) -> DbResult<u64> {
        let txn = self.db.begin_write()?;
        let next = {
            let mut counters = txn.open_table(SEQUENCES)?;
            let current = counters.get(T::TABLE)?.map(|guard| guard.value()).unwrap_or(0);
            counters.insert(T::TABLE, current + 1)?;
            current + 1
        };
        txn.commit()?;
        Ok(next)
    }

    pub fn get(&self, id: &T::Id) -> DbResult<Option<T>> {
        Ok(self.get_versioned(id)?.map(Versioned::into_inner))
    }

    pub fn get_versioned(&self, id: &T::Id) -> DbResult<Option<Versioned<T>>> {
        let key = key_of::<T>(id);
        self.read(|rows| read_row(rows, &key))
    }

    /// All documents matching `predicate`, in key order.
    pub fn find<F>(&self, predicate: F) -> DbResult<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let rows = self.read(|rows| scan::<T, _>(rows))?;
        Ok(rows
            .into_iter()
            .map(Versioned::into_inner)
            .filter(|value| predicate(value))
            .collect())
    }

    pub fn count<F>(&self, predicate: F) -> DbResult<usize>
    where
        F: Fn(&T) -> bool,
    {
        let rows = self.read(|rows| scan::<T, _>(rows))?;
        Ok(rows.iter().filter(|row| predicate(&row.value)).count())
    }

    pub fn len(&self) -> DbResult<usize> {
        let len = self.read(|rows| Ok(rows.len()?))?;
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Insert a new document outside of any transaction.
    pub fn insert(&self, value: T) -> DbResult<()> {
        self.write(|rows| {
            let key = key_of::<T>(value.id());
            let exists = rows.get(key.as_str())?.is_some();
            if exists {
                return Err(DbError::Duplicate { table: T::TABLE, id: key });
            }
            write_row(rows, &Versioned { version: 1, value })
        })
    }

    /// Replace a document if it is still at the version it was read at.
    /// Returns the new version.
    pub fn replace(&self, record: Versioned<T>) -> DbResult<u64> {
        self.write(|rows| {
            let key = key_of::<T>(record.id());
            let current = read_row::<T, _>(&*rows, &key)?;
            if current.map(|row| row.version) != Some(record.version) {
                return Err(DbError::Conflict { table: T::TABLE, id: key });
            }
            let next = Versioned {
                version: record.version + 1,
                value: record.value,
            };
            write_row(rows, &next)?;
            Ok(next.version)
        })
    }

    /// Apply `mutate` to one document atomically. Returns the updated copy,
    /// or `None` when the document does not exist.
    pub fn update<F>(&self, id: &T::Id, mutate: F) -> DbResult<Option<T>>
    where
        F: FnOnce(&mut T),
    {
        let key = key_of::<T>(id);
        self.write(|rows| {
            let Some(mut row) = read_row::<T, _>(&*rows, &key)? else {
                return Ok(None);
            };
            mutate(&mut row.value);
            row.version += 1;
            write_row(rows, &row)?;
            Ok(Some(row.value))
        })
    }

    /// Apply `mutate` to every document matching `predicate`. Returns how many
    /// documents were touched.
    pub fn update_where<P, F>(&self, predicate: P, mut mutate: F) -> DbResult<usize>
    where
        P: Fn(&T) -> bool,
        F: FnMut(&mut T),
    {
        self.write(|rows| {
            let matching: Vec<Versioned<T>> = scan::<T, _>(&*rows)?
                .into_iter()
                .filter(|row| predicate(&row.value))
                .collect();
            for mut row in matching.iter().cloned() {
                mutate(&mut row.value);
                row.version += 1;
                write_row(rows, &row)?;
            }
            Ok(matching.len())
        })
    }

    /// Delete every document matching `predicate`. Returns how many were removed.
    pub fn delete_where<P>(&self, predicate: P) -> DbResult<usize>
    where
        P: Fn(&T) -> bool,
    {
        self.write(|rows| {
            let doomed: Vec<String> = scan::<T, _>(&*rows)?
                .into_iter()
                .filter(|row| predicate(&row.value))
                .map(|row| key_of::<T>(row.id()))
                .collect();
            for key in &doomed {
                rows.remove(key.as_str())?;
            }
            Ok(doomed.len())
        })
    }
}
