// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory durable medium for the replication backlog.
//
// Uses a `BTreeMap` wrapped in an `RwLock` for thread-safe, key-ordered row
// storage. Intended for testing, development and deployments where the
// backlog only has to survive a replica reconnect, not a process restart.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StorageError;
use crate::medium::{SpaceUsage, TableMedium};
use crate::row::Row;

#[derive(Debug, Default)]
struct MemoryTable {
    /// `None` until the table is created, and again after it is dropped.
    rows: Option<BTreeMap<u64, Row>>,
    /// Sum of `Row::encoded_len` over all rows.
    used_bytes: u64,
    released: bool,
}

/// An in-memory medium backed by a sorted `BTreeMap`.
///
/// All rows live in process memory and are lost on drop. Clones share the
/// same table, which lets tests inspect or damage rows behind the tier.
///
/// # Example
///
/// ```rust
/// use verisim_backlog::medium::memory::MemoryMedium;
/// use verisim_backlog::medium::TableMedium;
///
/// let mut medium = MemoryMedium::new();
/// medium.create_table().unwrap();
/// assert_eq!(medium.row_count().unwrap(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    table: Arc<RwLock<MemoryTable>>,
    quota: Option<u64>,
}

impl MemoryMedium {
    /// Create an unbounded medium. The table is created by the tier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a medium that refuses writes beyond `quota` bytes.
    pub fn with_quota(quota: u64) -> Self {
        Self {
            table: Arc::default(),
            quota: Some(quota),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryTable>, StorageError> {
        let table = self
            .table
            .read()
            .map_err(|_| StorageError::BackendUnavailable("memory table lock poisoned".into()))?;
        if table.released {
            return Err(StorageError::Closed);
        }
        Ok(table)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryTable>, StorageError> {
        let table = self
            .table
            .write()
            .map_err(|_| StorageError::BackendUnavailable("memory table lock poisoned".into()))?;
        if table.released {
            return Err(StorageError::Closed);
        }
        Ok(table)
    }
}

fn missing() -> StorageError {
    StorageError::TableMissing("memory table not created".to_string())
}

impl TableMedium for MemoryMedium {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn create_table(&mut self) -> Result<(), StorageError> {
        let mut table = self.write()?;
        if table.rows.is_none() {
            table.rows = Some(BTreeMap::new());
            table.used_bytes = 0;
        }
        Ok(())
    }

    fn insert_rows(&mut self, rows: &[Row]) -> Result<usize, StorageError> {
        let mut guard = self.write()?;
        let table = &mut *guard;
        let map = table.rows.as_mut().ok_or_else(missing)?;

        let incoming: u64 = rows.iter().map(|row| row.encoded_len() as u64).sum();
        if let Some(quota) = self.quota {
            let available = quota.saturating_sub(table.used_bytes);
            if incoming > available {
                return Err(StorageError::Full {
                    requested: incoming,
                    available,
                });
            }
        }

        for row in rows {
            if let Some(previous) = map.insert(row.key, row.clone()) {
                table.used_bytes = table.used_bytes.saturating_sub(previous.encoded_len() as u64);
            }
        }
        table.used_bytes += incoming;
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
        let table = self.read()?;
        let map = table.rows.as_ref().ok_or_else(missing)?;
        Ok(map
            .range(from..=to)
            .skip(skip)
            .take(limit)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn delete_range(&mut self, from: u64, to: u64) -> Result<usize, StorageError> {
        if from > to {
            return Ok(0);
        }
        let mut guard = self.write()?;
        let table = &mut *guard;
        let map = table.rows.as_mut().ok_or_else(missing)?;

        let keys: Vec<u64> = map.range(from..=to).map(|(key, _)| *key).collect();
        for key in &keys {
            if let Some(row) = map.remove(key) {
                table.used_bytes = table.used_bytes.saturating_sub(row.encoded_len() as u64);
            }
        }
        Ok(keys.len())
    }

    fn first_key(&self) -> Result<Option<u64>, StorageError> {
        let table = self.read()?;
        let map = table.rows.as_ref().ok_or_else(missing)?;
        Ok(map.keys().next().copied())
    }

    fn last_key(&self) -> Result<Option<u64>, StorageError> {
        let table = self.read()?;
        let map = table.rows.as_ref().ok_or_else(missing)?;
        Ok(map.keys().next_back().copied())
    }

    fn row_count(&self) -> Result<u64, StorageError> {
        let table = self.read()?;
        let map = table.rows.as_ref().ok_or_else(missing)?;
        Ok(map.len() as u64)
    }

    fn drop_table(&mut self) -> Result<(), StorageError> {
        let mut table = self.write()?;
        table.rows = None;
        table.used_bytes = 0;
        Ok(())
    }

    fn release(&mut self) -> Result<(), StorageError> {
        let mut table = self
            .table
            .write()
            .map_err(|_| StorageError::BackendUnavailable("memory table lock poisoned".into()))?;
        table.released = true;
        Ok(())
    }

    fn space(&self) -> Result<SpaceUsage, StorageError> {
        let table = self.read()?;
        Ok(SpaceUsage {
            used_bytes: table.used_bytes,
            free_bytes: self
                .quota
                .map(|quota| quota.saturating_sub(table.used_bytes)),
        })
    }

    fn check_integrity(&mut self) -> Result<(), StorageError> {
        let table = self.read()?;
        let map = table.rows.as_ref().ok_or_else(missing)?;

        let mut used = 0u64;
        for (key, row) in map {
            if *key != row.key {
                return Err(StorageError::CorruptedData(format!(
                    "row stored under key {key} claims key {}",
                    row.key
                )));
            }
            used += row.encoded_len() as u64;
        }
        if used != table.used_bytes {
            return Err(StorageError::CorruptedData(format!(
                "space accounting drifted: tracked {} bytes, found {used}",
                table.used_bytes
            )));
        }
        Ok(())
    }
}
