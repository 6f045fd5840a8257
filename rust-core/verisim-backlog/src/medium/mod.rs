// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable media backing the backlog's durable tier.
//
// A medium is a key-ordered table of rows with range select/delete. It knows
// nothing about weights, codecs or the oldest-key bookkeeping; all of that
// lives in `crate::tier::TableTier`, which composes one medium with one codec.

use crate::error::StorageError;
use crate::row::Row;

pub mod memory;

#[cfg(feature = "redb-backend")]
pub mod redb_medium;

/// Space accounting reported by a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceUsage {
    /// Bytes currently occupied.
    pub used_bytes: u64,
    /// Bytes still available, or `None` when the medium is unbounded.
    pub free_bytes: Option<u64>,
}

impl SpaceUsage {
    /// Whether a write of `bytes` fits in the remaining space.
    pub fn fits(&self, bytes: u64) -> bool {
        self.free_bytes.map_or(true, |free| bytes <= free)
    }
}

/// A durable, key-ordered table holding one row per backlog record.
///
/// Ranges are closed: `from..=to`. Implementations must apply
/// [`TableMedium::insert_rows`] and [`TableMedium::delete_range`] atomically;
/// a failed call leaves no partial change visible.
pub trait TableMedium: Send {
    /// A human-readable name for this medium, used in logging.
    fn name(&self) -> &str;

    /// Create the backlog table if it does not exist yet.
    fn create_table(&mut self) -> Result<(), StorageError>;

    /// Insert a batch of rows in one atomic write. Returns rows affected.
    fn insert_rows(&mut self, rows: &[Row]) -> Result<usize, StorageError>;

    /// Select rows with `from <= key <= to` in key order, skipping the first
    /// `skip` matches and returning at most `limit` rows.
    fn select(&self, from: u64, to: u64, skip: usize, limit: usize)
        -> Result<Vec<Row>, StorageError>;

    /// Delete every row with `from <= key <= to`. Returns rows affected.
    fn delete_range(&mut self, from: u64, to: u64) -> Result<usize, StorageError>;

    /// Smallest key present, if any.
    fn first_key(&self) -> Result<Option<u64>, StorageError>;

    /// Largest key present, if any.
    fn last_key(&self) -> Result<Option<u64>, StorageError>;

    /// Number of rows in the table.
    fn row_count(&self) -> Result<u64, StorageError>;

    /// Drop the table and every row in it.
    fn drop_table(&mut self) -> Result<(), StorageError>;

    /// Release the underlying connection. Further calls fail with
    /// [`StorageError::Closed`].
    fn release(&mut self) -> Result<(), StorageError>;

    /// Report used and free space.
    fn space(&self) -> Result<SpaceUsage, StorageError>;

    /// Structural check of the medium. Corruption is reported as
    /// [`StorageError::CorruptedData`] and must never be repaired silently.
    fn check_integrity(&mut self) -> Result<(), StorageError>;
}
