// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The buffered replication log.
//
// `BufferedLog` composes a weighted in-memory `Buffer` with a `DurableTier`
// behind one FIFO contract. The durable tier always holds the oldest records
// and the buffer the newest; a flush moves the whole buffer to the tail of
// the durable tier in one batch.
//
// Flush policy:
// - `append` is weight-driven. A record that would overflow a non-empty
//   buffer flushes it first; a buffer that reaches capacity is flushed.
// - `append_batch` is count-driven and flushes once when the buffer holds
//   `buffer_capacity` records or more.
// - The buffer is cleared only after the durable append succeeded. A failed
//   flush leaves both tiers untouched and the caller's append is rolled back.
//
// Mutations take `&mut self`, so the borrow checker enforces one writer and
// keeps cursors (which borrow the log) out of the way while it writes.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::batch::{LimitReason, WeightedBatch};
use crate::buffer::Buffer;
use crate::config::BacklogConfig;
use crate::cursor::LogCursor;
use crate::error::{BacklogError, BacklogResult};
use crate::medium::SpaceUsage;
use crate::record::Record;
use crate::stats::{BacklogStats, LogCounters, SizeProbe};
use crate::tier::DurableTier;

/// A strictly ordered backlog of records split between memory and a durable
/// tier.
///
/// # Example
///
/// ```rust
/// use verisim_backlog::{BacklogConfig, BufferedLog, Record, TableTier};
///
/// let config = BacklogConfig::with_capacity(10);
/// let tier = TableTier::in_memory(&config).unwrap();
/// let mut log = BufferedLog::new(tier, config).unwrap();
///
/// log.append(Record::new(1, "write", vec![0; 4])).unwrap();
/// log.append(Record::new(2, "write", vec![0; 6])).unwrap();
/// assert_eq!(log.size(), 2);
/// assert_eq!(log.external_packets_count(), 2);
///
/// let batch = log.remove_first_batch(100, u64::MAX).unwrap();
/// assert_eq!(batch.len(), 2);
/// assert!(log.is_empty());
/// ```
pub struct BufferedLog<T: DurableTier> {
    tier: T,
    buffer: Buffer,
    config: BacklogConfig,
    counters: Arc<LogCounters>,
    last_key: Option<u64>,
    closed: bool,
}

impl<T: DurableTier> BufferedLog<T> {
    /// Wrap a durable tier, which may already hold recovered records.
    pub fn new(tier: T, config: BacklogConfig) -> BacklogResult<Self> {
        config.validate()?;
        let last_key = tier.newest_key()?;
        let log = Self {
            tier,
            buffer: Buffer::new(),
            config,
            counters: Arc::new(LogCounters::default()),
            last_key,
            closed: false,
        };
        log.publish_counters();
        Ok(log)
    }

    /// Append one record at the tail.
    ///
    /// A record heavier than the whole capacity is accepted and flushed on
    /// its own. Fails with `OutOfOrder` if the key does not follow the last
    /// key of the log.
    pub fn append(&mut self, record: Record) -> BacklogResult<()> {
        self.ensure_open()?;
        self.check_order(record.key)?;
        let capacity = self.config.buffer_capacity;

        if !self.buffer.is_empty() && self.buffer.weight().saturating_add(record.weight) > capacity
        {
            self.flush_buffer()?;
        }

        let previous_last = self.last_key.replace(record.key);
        self.buffer.push_back(record);

        if self.buffer.weight() >= capacity {
            if let Err(e) = self.flush_buffer() {
                self.buffer.pop_back();
                self.last_key = previous_last;
                self.publish_counters();
                return Err(e);
            }
        }
        self.publish_counters();
        Ok(())
    }

    /// Append several records, flushing once if the buffer then holds at
    /// least `buffer_capacity` records. Either every record is accepted or
    /// none is.
    pub fn append_batch(&mut self, records: Vec<Record>) -> BacklogResult<()> {
        self.ensure_open()?;
        let mut last = self.last_key;
        for record in &records {
            if let Some(last) = last.filter(|last| record.key <= *last) {
                return Err(BacklogError::OutOfOrder {
                    key: record.key,
                    last,
                });
            }
            last = Some(record.key);
        }
        let Some(new_last) = last.filter(|_| !records.is_empty()) else {
            return Ok(());
        };

        let previous_len = self.buffer.len();
        let previous_last = self.last_key.replace(new_last);
        for record in records {
            self.buffer.push_back(record);
        }

        if self.buffer.len() as u64 >= self.config.buffer_capacity {
            if let Err(e) = self.flush_buffer() {
                self.buffer.truncate(previous_len);
                self.last_key = previous_last;
                self.publish_counters();
                return Err(e);
            }
        }
        self.publish_counters();
        Ok(())
    }

    /// Remove records from the head: durable tier first, then the buffer.
    ///
    /// Never takes a record with `key > compaction_boundary`. A buffered
    /// record that would push the batch above `capacity` weight is left in
    /// place unless the batch is still empty, so one oversized record never
    /// blocks the head of the log.
    pub fn remove_first_batch(
        &mut self,
        capacity: u64,
        compaction_boundary: u64,
    ) -> BacklogResult<WeightedBatch> {
        self.ensure_open()?;
        let mut batch = self.tier.remove_first_batch(capacity, compaction_boundary)?;
        self.publish_counters();

        let mut from_buffer = 0usize;
        while batch.weight() < capacity && !batch.limit_reached() {
            let Some(head) = self.buffer.front() else {
                break;
            };
            if !batch.accepts(head.key) {
                break;
            }
            if !batch.is_empty() && batch.weight().saturating_add(head.weight) > capacity {
                batch.mark_limit(LimitReason::Weight);
                break;
            }
            let Some(record) = self.buffer.pop_front() else {
                break;
            };
            if let Err(record) = batch.push(record) {
                self.buffer.push_front(record);
                break;
            }
            from_buffer += 1;
        }

        let more_eligible = self
            .buffer
            .front()
            .is_some_and(|head| batch.accepts(head.key));
        if batch.weight() >= capacity && more_eligible {
            batch.mark_limit(LimitReason::Weight);
        }
        if batch.len() as u64 >= capacity {
            batch.mark_limit(LimitReason::Count);
        }

        self.publish_counters();
        debug!(
            records = batch.len(),
            from_buffer,
            weight = batch.weight(),
            weight_limit = batch.stopped_by(LimitReason::Weight),
            count_limit = batch.stopped_by(LimitReason::Count),
            "removed batch from backlog"
        );
        Ok(batch)
    }

    /// Delete up to `n` of the oldest records across both tiers. Returns the
    /// number actually deleted.
    pub fn delete_oldest_packets(&mut self, n: u64) -> BacklogResult<u64> {
        self.ensure_open()?;
        let durable = self.tier.delete_oldest(n)?;
        let buffered = self.buffer.drain_front(n.saturating_sub(durable));
        self.publish_counters();
        debug!(durable, buffered, "deleted oldest backlog records");
        Ok(durable + buffered)
    }

    /// Cursor over the log starting at position `from_index`.
    pub fn read_only_iterator(&self, from_index: u64) -> LogCursor<'_, T> {
        let durable = self.tier.size();
        if from_index < durable {
            LogCursor::durable(
                &self.tier,
                &self.buffer,
                usize::try_from(from_index).unwrap_or(usize::MAX),
                self.config.cursor_page_size,
            )
        } else {
            let offset = usize::try_from(from_index - durable).unwrap_or(usize::MAX);
            LogCursor::buffer_only(&self.tier, &self.buffer, offset)
        }
    }

    /// Move the whole buffer to the durable tier as one batch.
    pub fn flush_buffer(&mut self) -> BacklogResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let weight = self.buffer.weight();
        let records = self.buffer.make_contiguous();
        match self.tier.append_batch(records) {
            Ok(stored) => {
                self.buffer.clear();
                self.publish_counters();
                debug!(records = stored, weight, tier = self.tier.name(), "flushed buffer");
                Ok(())
            }
            Err(e) => {
                warn!(
                    records = self.buffer.len(),
                    weight,
                    error = %e,
                    "buffer flush failed; records kept in memory"
                );
                Err(e)
            }
        }
    }

    /// Remove every record with `from_key <= key <= to_key` from both tiers.
    pub fn perform_compaction(&mut self, from_key: u64, to_key: u64) -> BacklogResult<u64> {
        self.ensure_open()?;
        let durable = if self.tier.is_empty() {
            0
        } else {
            self.tier.perform_compaction(from_key, to_key)?
        };
        let buffered = if from_key <= to_key {
            self.buffer.remove_range(from_key, to_key)
        } else {
            0
        };
        self.publish_counters();
        debug!(from_key, to_key, durable, buffered, "compacted backlog");
        Ok(durable + buffered)
    }

    /// The oldest record of the log, if any.
    pub fn get_oldest(&self) -> BacklogResult<Option<Record>> {
        self.ensure_open()?;
        match self.tier.get_oldest()? {
            Some(record) => Ok(Some(record)),
            None => Ok(self.buffer.front().cloned()),
        }
    }

    /// Check the durable medium, then the split between the two tiers.
    pub fn validate_integrity(&self) -> BacklogResult<()> {
        self.ensure_open()?;
        self.tier.validate_integrity()?;

        let mut previous = self.tier.newest_key()?;
        for record in self.buffer.iter() {
            if let Some(previous) = previous.filter(|previous| record.key <= *previous) {
                return Err(BacklogError::IntegrityCompromised(format!(
                    "buffered key {} does not follow key {previous}",
                    record.key
                )));
            }
            previous = Some(record.key);
        }
        Ok(())
    }

    pub fn space(&self) -> BacklogResult<SpaceUsage> {
        self.ensure_open()?;
        self.tier.space()
    }

    /// Discard buffered records and close the durable tier.
    pub fn close(&mut self) -> BacklogResult<()> {
        self.ensure_open()?;
        self.buffer.clear();
        self.closed = true;
        let result = self.tier.close();
        self.publish_counters();
        result
    }

    /// Records in the log. Backed by atomics, never blocks.
    pub fn size(&self) -> u64 {
        self.counters.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Total weight across both tiers.
    pub fn weight(&self) -> u64 {
        self.counters.weight()
    }

    pub fn memory_packets_weight(&self) -> u64 {
        self.buffer.weight()
    }

    pub fn external_storage_packets_weight(&self) -> u64 {
        self.tier.weight()
    }

    pub fn memory_packets_count(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn external_packets_count(&self) -> u64 {
        self.tier.size()
    }

    /// A handle answering size queries from other threads.
    pub fn size_probe(&self) -> SizeProbe {
        SizeProbe::new(Arc::clone(&self.counters))
    }

    pub fn stats(&self) -> BacklogStats {
        self.counters.snapshot()
    }

    pub fn config(&self) -> &BacklogConfig {
        &self.config
    }

    pub fn tier(&self) -> &T {
        &self.tier
    }

    fn ensure_open(&self) -> BacklogResult<()> {
        if self.closed {
            return Err(BacklogError::Closed);
        }
        Ok(())
    }

    fn check_order(&self, key: u64) -> BacklogResult<()> {
        match self.last_key {
            Some(last) if key <= last => Err(BacklogError::OutOfOrder { key, last }),
            _ => Ok(()),
        }
    }

    fn publish_counters(&self) {
        self.counters.publish(BacklogStats {
            durable_count: self.tier.size(),
            durable_weight: self.tier.weight(),
            buffer_count: self.buffer.len() as u64,
            buffer_weight: self.buffer.weight(),
        });
    }
}

impl<T: DurableTier> std::fmt::Debug for BufferedLog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedLog")
            .field("tier", &self.tier.name())
            .field("stats", &self.stats())
            .field("last_key", &self.last_key)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::memory::MemoryMedium;
    use crate::tier::TableTier;

    fn record(key: u64, weight: u64) -> Record {
        Record::new(key, "write", format!("p{key}").into_bytes()).with_weight(weight)
    }

    fn log_with_capacity(capacity: u64) -> BufferedLog<TableTier<MemoryMedium>> {
        let config = BacklogConfig::with_capacity(capacity);
        let tier = TableTier::in_memory(&config).unwrap();
        BufferedLog::new(tier, config).unwrap()
    }

    fn all_keys<T: DurableTier>(log: &BufferedLog<T>) -> Vec<u64> {
        log.read_only_iterator(0)
            .map(|record| record.unwrap().key)
            .collect()
    }

    #[test]
    fn test_oversized_record_is_accepted_and_flushed() {
        let mut log = log_with_capacity(10);
        log.append(record(1, 50)).unwrap();
        assert_eq!(log.external_packets_count(), 1);
        assert_eq!(log.memory_packets_count(), 0);
    }

    #[test]
    fn test_overflowing_record_flushes_buffer_first() {
        let mut log = log_with_capacity(10);
        log.append(record(1, 3)).unwrap();
        log.append(record(2, 4)).unwrap();
        assert_eq!(log.memory_packets_weight(), 7);

        log.append(record(3, 5)).unwrap();
        assert_eq!(log.external_packets_count(), 2);
        assert_eq!(log.memory_packets_count(), 1);
        assert_eq!(log.memory_packets_weight(), 5);
        assert_eq!(log.external_storage_packets_weight(), 7);
        assert_eq!(log.weight(), 12);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut log = log_with_capacity(10);
        log.append(record(5, 1)).unwrap();
        let err = log.append(record(5, 1)).unwrap_err();
        assert!(matches!(err, BacklogError::OutOfOrder { key: 5, last: 5 }));

        let err = log
            .append_batch(vec![record(6, 1), record(8, 1), record(7, 1)])
            .unwrap_err();
        assert!(matches!(err, BacklogError::OutOfOrder { key: 7, last: 8 }));
        assert_eq!(log.size(), 1);
    }

    #[test]
    fn test_append_batch_flushes_on_count() {
        let mut log = log_with_capacity(3);
        log.append_batch(vec![record(1, 0), record(2, 0)]).unwrap();
        assert_eq!(log.memory_packets_count(), 2);
        log.append_batch(vec![record(3, 0)]).unwrap();
        assert_eq!(log.memory_packets_count(), 0);
        assert_eq!(log.external_packets_count(), 3);
        log.append_batch(Vec::new()).unwrap();
        assert_eq!(log.size(), 3);
    }

    #[test]
    fn test_failed_flush_rolls_back_append() {
        let config = BacklogConfig {
            buffer_capacity: 10,
            max_storage_bytes: Some(32),
            ..Default::default()
        };
        let tier = TableTier::in_memory(&config).unwrap();
        let mut log = BufferedLog::new(tier, config).unwrap();

        log.append(record(1, 4)).unwrap();
        let err = log.append(record(2, 6)).unwrap_err();
        assert!(matches!(err, BacklogError::StorageFull { .. }));
        assert_eq!(log.memory_packets_count(), 1);
        assert_eq!(log.memory_packets_weight(), 4);
        assert_eq!(log.size(), 1);

        // The rejected key may be retried.
        log.append(record(2, 1)).unwrap();
        assert_eq!(log.size(), 2);
    }

    #[test]
    fn test_remove_drains_durable_then_buffer() {
        let mut log = log_with_capacity(4);
        for key in 1..=6 {
            log.append(record(key, 1)).unwrap();
        }
        assert_eq!(log.external_packets_count(), 4);

        let batch = log.remove_first_batch(100, u64::MAX).unwrap();
        let keys: Vec<u64> = batch.records().iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6]);
        assert!(!batch.limit_reached());
        assert!(log.is_empty());
    }

    #[test]
    fn test_remove_stops_on_weight_without_consuming() {
        let mut log = log_with_capacity(100);
        for (key, weight) in [(1, 2), (2, 2), (3, 2)] {
            log.append(record(key, weight)).unwrap();
        }

        let batch = log.remove_first_batch(5, u64::MAX).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.weight(), 4);
        assert!(batch.stopped_by(LimitReason::Weight));
        assert!(!batch.stopped_by(LimitReason::Count));
        assert_eq!(log.memory_packets_count(), 1);
    }

    #[test]
    fn test_remove_takes_oversized_head_only_into_empty_batch() {
        let mut log = log_with_capacity(100);
        log.append(record(1, 9)).unwrap();
        log.append(record(2, 1)).unwrap();

        let batch = log.remove_first_batch(4, u64::MAX).unwrap();
        assert_eq!(batch.last_key(), Some(1));
        assert_eq!(batch.weight(), 9);
        assert!(batch.stopped_by(LimitReason::Weight));

        // Durable records already in the batch block an overflowing head.
        log.flush_buffer().unwrap();
        log.append(record(3, 5)).unwrap();
        let batch = log.remove_first_batch(4, u64::MAX).unwrap();
        assert_eq!(batch.last_key(), Some(2));
        assert_eq!(batch.weight(), 1);
        assert!(batch.stopped_by(LimitReason::Weight));
        assert_eq!(log.memory_packets_count(), 1);
    }

    #[test]
    fn test_remove_count_limit() {
        let mut log = log_with_capacity(2);
        log.append_batch((1..=4).map(|key| record(key, 0)).collect())
            .unwrap();
        assert_eq!(log.external_packets_count(), 4);

        let batch = log.remove_first_batch(2, u64::MAX).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.stopped_by(LimitReason::Count));
        assert!(!batch.stopped_by(LimitReason::Weight));
        assert_eq!(log.size(), 2);
    }

    #[test]
    fn test_remove_respects_boundary_in_buffer() {
        let mut log = log_with_capacity(100);
        for key in 1..=5 {
            log.append(record(key, 1)).unwrap();
        }
        let batch = log.remove_first_batch(100, 3).unwrap();
        assert_eq!(batch.last_key(), Some(3));
        assert!(!batch.limit_reached());
        assert_eq!(log.size(), 2);
    }

    #[test]
    fn test_read_only_iterator_positions() {
        let mut log = log_with_capacity(3);
        for key in 1..=5 {
            log.append(record(key, 1)).unwrap();
        }
        assert_eq!(log.external_packets_count(), 3);
        assert_eq!(all_keys(&log), vec![1, 2, 3, 4, 5]);

        let from_durable: Vec<u64> = log
            .read_only_iterator(2)
            .map(|r| r.unwrap().key)
            .collect();
        assert_eq!(from_durable, vec![3, 4, 5]);

        let from_buffer: Vec<u64> = log
            .read_only_iterator(4)
            .map(|r| r.unwrap().key)
            .collect();
        assert_eq!(from_buffer, vec![5]);
        assert_eq!(log.read_only_iterator(9).count(), 0);
    }

    #[test]
    fn test_compaction_across_tiers() {
        let mut log = log_with_capacity(3);
        for key in 1..=5 {
            log.append(record(key, 1)).unwrap();
        }
        assert_eq!(log.perform_compaction(2, 4).unwrap(), 3);
        assert_eq!(all_keys(&log), vec![1, 5]);
        assert_eq!(log.size(), 2);
        log.validate_integrity().unwrap();
    }

    #[test]
    fn test_get_oldest_falls_back_to_buffer() {
        let mut log = log_with_capacity(100);
        assert!(log.get_oldest().unwrap().is_none());
        log.append(record(7, 1)).unwrap();
        assert_eq!(log.get_oldest().unwrap().unwrap().key, 7);
        log.flush_buffer().unwrap();
        assert_eq!(log.get_oldest().unwrap().unwrap().key, 7);
    }

    #[test]
    fn test_size_probe_tracks_log() {
        let mut log = log_with_capacity(2);
        let probe = log.size_probe();
        log.append(record(1, 1)).unwrap();
        log.append(record(2, 1)).unwrap();
        log.append(record(3, 1)).unwrap();
        assert_eq!(probe.size(), 3);
        assert_eq!(probe.stats().durable_count, 2);

        log.delete_oldest_packets(10).unwrap();
        assert!(probe.is_empty());
    }

    #[test]
    fn test_close() {
        let mut log = log_with_capacity(10);
        log.append(record(1, 1)).unwrap();
        log.close().unwrap();
        assert!(log.is_empty());
        assert!(matches!(
            log.append(record(2, 1)).unwrap_err(),
            BacklogError::Closed
        ));
        assert!(matches!(log.close().unwrap_err(), BacklogError::Closed));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BacklogConfig::with_capacity(0);
        let tier = TableTier::in_memory(&BacklogConfig::default()).unwrap();
        assert!(matches!(
            BufferedLog::new(tier, config).unwrap_err(),
            BacklogError::InvalidConfig(_)
        ));
    }
}
