// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable tier of the replication backlog.
//
// `DurableTier` is the contract the buffered log relies on: an append-only,
// key-ordered FIFO store that owns the durability guarantee. `TableTier`
// implements it once for every `TableMedium` by composing the medium with a
// `RecordCodec` and the row glue in `crate::row`.
//
// Count and weight live in atomics so `size()` never waits on the I/O lock.
// The oldest key is kept under the lock next to the medium and re-read from
// the medium's ordered index after each deletion.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::batch::{LimitReason, WeightedBatch};
use crate::codec::{BinaryCodec, RecordCodec};
use crate::config::BacklogConfig;
use crate::error::{BacklogError, BacklogResult, StorageError};
use crate::medium::memory::MemoryMedium;
use crate::medium::{SpaceUsage, TableMedium};
use crate::record::Record;
use crate::row::Row;

#[cfg(feature = "redb-backend")]
use crate::medium::redb_medium::RedbMedium;
#[cfg(feature = "redb-backend")]
use std::path::Path;

/// Rows read per round trip while rebuilding counters at open time.
const RECOVERY_PAGE: usize = 1024;

/// One page of a durable scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Decoded records, in key order.
    pub records: Vec<Record>,
    /// Rows on this page that failed to decode and were left out.
    pub skipped: usize,
    /// Key to resume from, or `None` once the tier has no further rows.
    pub next_key: Option<u64>,
}

/// Append-only, key-ordered store backing the log beyond the buffer.
///
/// Mutations take `&self`; implementations serialize their own I/O. Callers
/// must still supply strictly increasing keys and run one writer at a time.
pub trait DurableTier: Send + Sync {
    /// A human-readable name for this tier, used in logging.
    fn name(&self) -> &str;

    /// Insert `records` as one atomic batch. Returns the records stored.
    fn append_batch(&self, records: &[Record]) -> BacklogResult<usize>;

    /// Remove up to `capacity` records from the head, never past
    /// `compaction_boundary`. Undecodable rows are dropped from the batch
    /// but still deleted.
    fn remove_first_batch(
        &self,
        capacity: u64,
        compaction_boundary: u64,
    ) -> BacklogResult<WeightedBatch>;

    /// Delete up to `n` of the oldest records. Returns records deleted.
    fn delete_oldest(&self, n: u64) -> BacklogResult<u64>;

    /// Number of rows held. Never scans and never blocks on I/O.
    fn size(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Total weight of the held records.
    fn weight(&self) -> u64;

    /// Smallest key present.
    fn oldest_key(&self) -> BacklogResult<Option<u64>>;

    /// Largest key present.
    fn newest_key(&self) -> BacklogResult<Option<u64>>;

    /// The record at the oldest key.
    fn get_oldest(&self) -> BacklogResult<Option<Record>>;

    /// Read up to `limit` rows with key `>= from_key`, after skipping `skip`
    /// of them. Skipped positions include rows that fail to decode.
    fn scan(&self, from_key: u64, skip: usize, limit: usize) -> BacklogResult<ScanPage>;

    /// Structural check of the backing medium and of the tier's counters.
    fn validate_integrity(&self) -> BacklogResult<()>;

    /// Remove every record with `from_key <= key <= to_key`.
    fn perform_compaction(&self, _from_key: u64, _to_key: u64) -> BacklogResult<u64> {
        Err(BacklogError::Unsupported("perform_compaction"))
    }

    /// Used and free space of the backing medium.
    fn space(&self) -> BacklogResult<SpaceUsage>;

    /// Drop the table and release the medium. Later calls fail with
    /// [`BacklogError::Closed`].
    fn close(&self) -> BacklogResult<()>;
}

struct TierInner<M> {
    medium: M,
    oldest_key: Option<u64>,
}

/// A [`DurableTier`] over any [`TableMedium`].
///
/// # Example
///
/// ```rust
/// use verisim_backlog::{BacklogConfig, DurableTier, Record, TableTier};
///
/// let tier = TableTier::in_memory(&BacklogConfig::default()).unwrap();
/// tier.append_batch(&[Record::new(1, "write", b"abc".to_vec())]).unwrap();
/// assert_eq!(tier.size(), 1);
/// assert_eq!(tier.oldest_key().unwrap(), Some(1));
/// ```
pub struct TableTier<M: TableMedium> {
    inner: Mutex<TierInner<M>>,
    codec: Box<dyn RecordCodec>,
    name: String,
    count: AtomicU64,
    weight: AtomicU64,
    closed: AtomicBool,
}

impl TableTier<MemoryMedium> {
    /// In-memory tier using the binary codec and the configured quota.
    pub fn in_memory(config: &BacklogConfig) -> BacklogResult<Self> {
        let medium = match config.max_storage_bytes {
            Some(quota) => MemoryMedium::with_quota(quota),
            None => MemoryMedium::new(),
        };
        Self::open(medium, Box::new(BinaryCodec))
    }
}

#[cfg(feature = "redb-backend")]
impl TableTier<RedbMedium> {
    /// redb-backed tier at `path`, using the configured table name and quota.
    pub fn redb(path: impl AsRef<Path>, config: &BacklogConfig) -> BacklogResult<Self> {
        let medium = RedbMedium::open(path, config.table_name.clone())?
            .with_quota(config.max_storage_bytes);
        Self::open(medium, Box::new(BinaryCodec))
    }
}

impl<M: TableMedium> TableTier<M> {
    /// Create the table if needed and rebuild count, weight and oldest key
    /// from the rows already present.
    pub fn open(mut medium: M, codec: Box<dyn RecordCodec>) -> BacklogResult<Self> {
        medium.create_table()?;

        let mut count = 0u64;
        let mut weight = 0u64;
        let mut corrupt = 0u64;
        let mut from = 0u64;
        loop {
            let rows = medium.select(from, u64::MAX, 0, RECOVERY_PAGE)?;
            for row in &rows {
                count += 1;
                weight = weight.saturating_add(row.weight);
                if let Err(e) = row.decode_record(codec.as_ref()) {
                    corrupt += 1;
                    warn!(key = row.key, error = %e, "undecodable backlog row found during recovery");
                }
            }
            let next = rows.last().and_then(|row| row.key.checked_add(1));
            match next {
                Some(next) if rows.len() == RECOVERY_PAGE => from = next,
                _ => break,
            }
        }
        let oldest_key = medium.first_key()?;

        let name = format!("table-tier({})", medium.name());
        info!(
            tier = %name,
            codec = codec.type_tag(),
            records = count,
            weight,
            corrupt,
            oldest_key = ?oldest_key,
            "opened durable tier"
        );

        Ok(Self {
            inner: Mutex::new(TierInner { medium, oldest_key }),
            codec,
            name,
            count: AtomicU64::new(count),
            weight: AtomicU64::new(weight),
            closed: AtomicBool::new(false),
        })
    }

    /// Type tag of the codec writing this tier's rows.
    pub fn codec_tag(&self) -> &'static str {
        self.codec.type_tag()
    }

    fn lock(&self) -> BacklogResult<MutexGuard<'_, TierInner<M>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BacklogError::Closed);
        }
        self.inner.lock().map_err(|_| {
            BacklogError::Storage(StorageError::BackendUnavailable(
                "durable tier lock poisoned".to_string(),
            ))
        })
    }

    /// Decode rows, logging and dropping the ones that fail.
    fn decode_rows(&self, rows: &[Row], during: &'static str) -> (Vec<Record>, usize) {
        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for row in rows {
            match row.decode_record(self.codec.as_ref()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(key = row.key, during, error = %e, "skipping undecodable backlog record");
                }
            }
        }
        (records, skipped)
    }

    /// Apply a committed deletion of `deleted` rows weighing `weight` to the
    /// counters and refresh the oldest key.
    ///
    /// The counters always follow the medium. If the oldest key cannot be
    /// re-read, the previous one is kept (it is still a lower bound for
    /// every key present) and the tier reports `IntegrityCompromised`.
    fn account_deletion(
        &self,
        inner: &mut TierInner<M>,
        deleted: u64,
        weight: u64,
    ) -> BacklogResult<()> {
        let remaining = self
            .count
            .load(Ordering::Acquire)
            .saturating_sub(deleted);
        self.count.store(remaining, Ordering::Release);
        let weight = if remaining == 0 {
            0
        } else {
            self.weight.load(Ordering::Acquire).saturating_sub(weight)
        };
        self.weight.store(weight, Ordering::Release);

        match inner.medium.first_key() {
            Ok(oldest) => {
                inner.oldest_key = oldest;
                Ok(())
            }
            Err(e) => {
                warn!(tier = %self.name, deleted, error = %e, "oldest key unreadable after deletion");
                Err(BacklogError::IntegrityCompromised(format!(
                    "deleted {deleted} rows but could not re-read the oldest key: {e}"
                )))
            }
        }
    }
}

/// Weight recorded in the rows themselves, readable or not.
fn stored_weight(rows: &[Row]) -> u64 {
    rows.iter().fold(0u64, |acc, row| acc.saturating_add(row.weight))
}

impl<M: TableMedium> DurableTier for TableTier<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn append_batch(&self, records: &[Record]) -> BacklogResult<usize> {
        let mut inner = self.lock()?;
        let Some(first) = records.first() else {
            return Ok(0);
        };

        let rows = records
            .iter()
            .map(|record| Row::from_record(self.codec.as_ref(), record))
            .collect::<Result<Vec<_>, _>>()?;

        let requested: u64 = rows.iter().map(|row| row.encoded_len() as u64).sum();
        let space = inner.medium.space()?;
        if !space.fits(requested) {
            return Err(BacklogError::StorageFull {
                requested,
                available: space.free_bytes.unwrap_or(0),
            });
        }

        let inserted = inner.medium.insert_rows(&rows)?;
        let added_weight = records
            .iter()
            .fold(0u64, |acc, record| acc.saturating_add(record.weight));
        self.count.fetch_add(inserted as u64, Ordering::AcqRel);
        let weight = self.weight.load(Ordering::Acquire).saturating_add(added_weight);
        self.weight.store(weight, Ordering::Release);
        if inner.oldest_key.is_none() {
            inner.oldest_key = Some(first.key);
        }
        Ok(inserted)
    }

    fn remove_first_batch(
        &self,
        capacity: u64,
        compaction_boundary: u64,
    ) -> BacklogResult<WeightedBatch> {
        let mut inner = self.lock()?;
        let mut batch = WeightedBatch::new(compaction_boundary);
        let oldest = match inner.oldest_key {
            Some(oldest) if oldest <= compaction_boundary && capacity > 0 => oldest,
            _ => return Ok(batch),
        };

        let limit = usize::try_from(capacity).unwrap_or(usize::MAX);
        let rows = inner
            .medium
            .select(oldest, compaction_boundary, 0, limit)?;
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Ok(batch);
        };
        let (first, last) = (first.key, last.key);

        let (records, skipped) = self.decode_rows(&rows, "batch removal");
        for record in records {
            if let Err(record) = batch.push(record) {
                return Err(BacklogError::IntegrityCompromised(format!(
                    "{} returned key {} beyond boundary {compaction_boundary}",
                    inner.medium.name(),
                    record.key
                )));
            }
        }

        let deleted = inner.medium.delete_range(first, last)? as u64;
        self.account_deletion(&mut inner, deleted, stored_weight(&rows))?;
        if rows.len() as u64 == capacity {
            batch.mark_limit(LimitReason::Count);
        }

        debug!(
            tier = %self.name,
            deleted,
            records = batch.len(),
            skipped,
            weight = batch.weight(),
            limit_reached = batch.limit_reached(),
            "removed batch from durable tier"
        );
        Ok(batch)
    }

    fn delete_oldest(&self, n: u64) -> BacklogResult<u64> {
        let mut inner = self.lock()?;
        let oldest = match inner.oldest_key {
            Some(oldest) if n > 0 => oldest,
            _ => return Ok(0),
        };

        let limit = usize::try_from(n).unwrap_or(usize::MAX);
        let rows = inner.medium.select(oldest, u64::MAX, 0, limit)?;
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Ok(0);
        };
        let (first, last) = (first.key, last.key);

        let weight = stored_weight(&rows);
        let deleted = inner.medium.delete_range(first, last)? as u64;
        self.account_deletion(&mut inner, deleted, weight)?;

        debug!(tier = %self.name, deleted, weight, "deleted oldest durable records");
        Ok(deleted)
    }

    fn size(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    fn weight(&self) -> u64 {
        self.weight.load(Ordering::Acquire)
    }

    fn oldest_key(&self) -> BacklogResult<Option<u64>> {
        Ok(self.lock()?.oldest_key)
    }

    fn newest_key(&self) -> BacklogResult<Option<u64>> {
        Ok(self.lock()?.medium.last_key()?)
    }

    fn get_oldest(&self) -> BacklogResult<Option<Record>> {
        let inner = self.lock()?;
        let Some(oldest) = inner.oldest_key else {
            return Ok(None);
        };
        let rows = inner.medium.select(oldest, u64::MAX, 0, 1)?;
        match rows.first() {
            Some(row) => Ok(Some(row.decode_record(self.codec.as_ref())?)),
            None => Ok(None),
        }
    }

    fn scan(&self, from_key: u64, skip: usize, limit: usize) -> BacklogResult<ScanPage> {
        let inner = self.lock()?;
        let rows = inner.medium.select(from_key, u64::MAX, skip, limit)?;
        drop(inner);

        let next_key = if rows.len() < limit {
            None
        } else {
            rows.last().and_then(|row| row.key.checked_add(1))
        };
        let (records, skipped) = self.decode_rows(&rows, "scan");
        Ok(ScanPage {
            records,
            skipped,
            next_key,
        })
    }

    fn validate_integrity(&self) -> BacklogResult<()> {
        let mut inner = self.lock()?;
        inner.medium.check_integrity()?;

        let rows = inner.medium.row_count()?;
        let tracked = self.size();
        if rows != tracked {
            return Err(BacklogError::IntegrityCompromised(format!(
                "{} holds {rows} rows but the tier tracks {tracked}",
                inner.medium.name()
            )));
        }

        let first = inner.medium.first_key()?;
        if first != inner.oldest_key {
            return Err(BacklogError::IntegrityCompromised(format!(
                "oldest key drifted: medium starts at {first:?}, tier tracks {:?}",
                inner.oldest_key
            )));
        }
        Ok(())
    }

    fn perform_compaction(&self, from_key: u64, to_key: u64) -> BacklogResult<u64> {
        let mut inner = self.lock()?;
        if from_key > to_key {
            return Ok(0);
        }

        let rows = inner.medium.select(from_key, to_key, 0, usize::MAX)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let weight = stored_weight(&rows);
        let deleted = inner.medium.delete_range(from_key, to_key)? as u64;
        self.account_deletion(&mut inner, deleted, weight)?;

        debug!(tier = %self.name, from_key, to_key, deleted, "compacted durable tier");
        Ok(deleted)
    }

    fn space(&self) -> BacklogResult<SpaceUsage> {
        Ok(self.lock()?.medium.space()?)
    }

    fn close(&self) -> BacklogResult<()> {
        let mut inner = self.lock()?;
        inner.medium.drop_table()?;
        inner.medium.release()?;
        inner.oldest_key = None;
        self.count.store(0, Ordering::Release);
        self.weight.store(0, Ordering::Release);
        self.closed.store(true, Ordering::Release);
        info!(tier = %self.name, "closed durable tier");
        Ok(())
    }
}

impl<M: TableMedium> std::fmt::Debug for TableTier<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableTier")
            .field("name", &self.name)
            .field("codec", &self.codec.type_tag())
            .field("count", &self.size())
            .field("weight", &self.weight())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
