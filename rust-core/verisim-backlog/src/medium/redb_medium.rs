// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// redb-backed durable medium for the replication backlog.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) so the backlog
// survives process restarts. No C/C++ dependencies.
//
// # Design
//
// - Single redb `Database` file, one table `u64 -> &[u8]` per backlog. The
//   value packs the non-key row columns (see `crate::row`).
// - Read transactions for select/first/last/count.
// - One write transaction per insert batch or range delete, so a failed
//   call leaves nothing half-applied.
// - `check_integrity` delegates to redb's own structural check.
// - `release` drops the `Database`, closing the file.

use std::path::{Path, PathBuf};

use redb::{
    Database, ReadOnlyTable, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, TableError,
};
use tracing::debug;

use crate::error::StorageError;
use crate::medium::{SpaceUsage, TableMedium};
use crate::row::Row;

type RowTable = ReadOnlyTable<u64, &'static [u8]>;

/// A persistent medium powered by redb.
///
/// # Example
///
/// ```rust,no_run
/// use verisim_backlog::medium::redb_medium::RedbMedium;
/// use verisim_backlog::medium::TableMedium;
///
/// let mut medium = RedbMedium::open("/tmp/verisim-backlog.redb", "redo_log").unwrap();
/// medium.create_table().unwrap();
/// assert_eq!(medium.row_count().unwrap(), 0);
/// ```
pub struct RedbMedium {
    /// The redb database handle; `None` once released.
    db: Option<Database>,
    /// Path to the database file (for diagnostics and space accounting).
    path: PathBuf,
    /// Name of the backlog table inside the database.
    table_name: String,
    /// Optional size limit of the database file in bytes.
    quota: Option<u64>,
}

impl RedbMedium {
    /// Open or create a redb database at the given path.
    ///
    /// Creates parent directories if they don't exist. The table itself is
    /// created by [`TableMedium::create_table`].
    pub fn open(path: impl AsRef<Path>, table_name: impl Into<String>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!("failed to open redb at {}: {}", path.display(), e))
        })?;

        let table_name = table_name.into();
        debug!(path = %path.display(), table = %table_name, "opened redb medium");

        Ok(Self {
            db: Some(db),
            path,
            table_name,
            quota: None,
        })
    }

    /// Refuse inserts once the database file would exceed `quota` bytes.
    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn definition(&self) -> TableDefinition<'_, u64, &'static [u8]> {
        TableDefinition::new(&self.table_name)
    }

    fn database(&self) -> Result<&Database, StorageError> {
        self.db.as_ref().ok_or(StorageError::Closed)
    }

    /// Run `f` against the backlog table inside a read transaction.
    fn with_read_table<T>(
        &self,
        f: impl FnOnce(&RowTable) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let txn = self
            .database()?
            .begin_read()
            .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
        let table = match txn.open_table(self.definition()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(name)) => {
                return Err(StorageError::TableMissing(name))
            }
            Err(e) => return Err(StorageError::BackendUnavailable(format!("open table: {e}"))),
        };
        f(&table)
    }
}

impl std::fmt::Debug for RedbMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbMedium")
            .field("path", &self.path)
            .field("table", &self.table_name)
            .field("open", &self.db.is_some())
            .finish()
    }
}

impl TableMedium for RedbMedium {
    fn name(&self) -> &str {
        "redb"
    }

    fn create_table(&mut self) -> Result<(), StorageError> {
        let txn = self
            .database()?
            .begin_write()
            .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
        txn.open_table(self.definition())
            .map_err(|e| StorageError::BackendUnavailable(format!("create table: {e}")))?;
        txn.commit()
            .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
        Ok(())
    }

    fn insert_rows(&mut self, rows: &[Row]) -> Result<usize, StorageError> {
        let incoming: u64 = rows.iter().map(|row| row.encoded_len() as u64).sum();
        let space = self.space()?;
        if !space.fits(incoming) {
            return Err(StorageError::Full {
                requested: incoming,
                available: space.free_bytes.unwrap_or(0),
            });
        }

        let txn = self
            .database()?
            .begin_write()
            .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
        {
            let mut table = txn
                .open_table(self.definition())
                .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
            for row in rows {
                let value = row.encode_columns();
                table
                    .insert(row.key, value.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("batch insert: {e}")))?;
            }
        }
        txn.commit()
            .map_err(|e| StorageError::CorruptedData(format!("batch commit: {e}")))?;
        Ok(rows.len())
    }

    fn select(
        &self,
        from: u64,
        to: u64,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Row>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }
        self.with_read_table(|table| {
            let iter = table
                .range(from..=to)
                .map_err(|e| StorageError::CorruptedData(format!("range scan: {e}")))?;

            let mut rows = Vec::new();
            for entry in iter.skip(skip).take(limit) {
                let (key, value) =
                    entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
                rows.push(Row::decode_columns(key.value(), value.value())?);
            }
            Ok(rows)
        })
    }

    fn delete_range(&mut self, from: u64, to: u64) -> Result<usize, StorageError> {
        if from > to {
            return Ok(0);
        }
        let txn = self
            .database()?
            .begin_write()
            .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
        let deleted;
        {
            let mut table = txn
                .open_table(self.definition())
                .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;

            let mut keys = Vec::new();
            for entry in table
                .range(from..=to)
                .map_err(|e| StorageError::CorruptedData(format!("range scan: {e}")))?
            {
                let (key, _) =
                    entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
                keys.push(key.value());
            }

            for key in &keys {
                table
                    .remove(*key)
                    .map_err(|e| StorageError::CorruptedData(format!("remove: {e}")))?;
            }
            deleted = keys.len();
        }
        txn.commit()
            .map_err(|e| StorageError::CorruptedData(format!("delete commit: {e}")))?;
        Ok(deleted)
    }

    fn first_key(&self) -> Result<Option<u64>, StorageError> {
        self.with_read_table(|table| {
            let first = table
                .first()
                .map_err(|e| StorageError::CorruptedData(format!("first: {e}")))?;
            Ok(first.map(|(key, _)| key.value()))
        })
    }

    fn last_key(&self) -> Result<Option<u64>, StorageError> {
        self.with_read_table(|table| {
            let last = table
                .last()
                .map_err(|e| StorageError::CorruptedData(format!("last: {e}")))?;
            Ok(last.map(|(key, _)| key.value()))
        })
    }

    fn row_count(&self) -> Result<u64, StorageError> {
        self.with_read_table(|table| {
            table
                .len()
                .map_err(|e| StorageError::CorruptedData(format!("len: {e}")))
        })
    }

    fn drop_table(&mut self) -> Result<(), StorageError> {
        let txn = self
            .database()?
            .begin_write()
            .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
        txn.delete_table(self.definition())
            .map_err(|e| StorageError::BackendUnavailable(format!("delete table: {e}")))?;
        txn.commit()
            .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
        debug!(table = %self.table_name, "dropped redb table");
        Ok(())
    }

    fn release(&mut self) -> Result<(), StorageError> {
        if self.db.take().is_some() {
            debug!(path = %self.path.display(), "released redb medium");
        }
        Ok(())
    }

    fn space(&self) -> Result<SpaceUsage, StorageError> {
        self.database()?;
        let used_bytes = std::fs::metadata(&self.path)?.len();
        Ok(SpaceUsage {
            used_bytes,
            free_bytes: self.quota.map(|quota| quota.saturating_sub(used_bytes)),
        })
    }

    fn check_integrity(&mut self) -> Result<(), StorageError> {
        let db = self.db.as_mut().ok_or(StorageError::Closed)?;
        match db.check_integrity() {
            Ok(true) => Ok(()),
            Ok(false) => Err(StorageError::CorruptedData(
                "redb found damaged pages and repaired them; rows may be missing".to_string(),
            )),
            Err(e) => Err(StorageError::CorruptedData(format!("integrity check: {e}"))),
        }
    }
}
