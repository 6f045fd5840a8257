// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Result of a batch removal from the head of the backlog.

use crate::record::Record;

/// Why a removal stopped before draining every eligible record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitReason {
    /// Taking the next record would have pushed the batch weight past the
    /// requested capacity.
    Weight,
    /// The batch holds as many records as the requested capacity.
    Count,
}

/// Records pulled from the head of the log by one removal call.
///
/// The aggregate weight is maintained as records are pushed. Records with a
/// key above the compaction boundary are never accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedBatch {
    records: Vec<Record>,
    weight: u64,
    compaction_boundary: u64,
    weight_limit: bool,
    count_limit: bool,
}

impl WeightedBatch {
    /// Empty batch that will only accept keys `<= compaction_boundary`.
    pub fn new(compaction_boundary: u64) -> Self {
        Self {
            records: Vec::new(),
            weight: 0,
            compaction_boundary,
            weight_limit: false,
            count_limit: false,
        }
    }

    /// Whether a record with this key may enter the batch.
    pub fn accepts(&self, key: u64) -> bool {
        key <= self.compaction_boundary
    }

    /// Append a record. A record past the compaction boundary is handed
    /// back untouched.
    pub fn push(&mut self, record: Record) -> Result<(), Record> {
        if !self.accepts(record.key) {
            return Err(record);
        }
        self.weight = self.weight.saturating_add(record.weight);
        self.records.push(record);
        Ok(())
    }

    /// Record that the removal stopped for `reason`.
    pub fn mark_limit(&mut self, reason: LimitReason) {
        match reason {
            LimitReason::Weight => self.weight_limit = true,
            LimitReason::Count => self.count_limit = true,
        }
    }

    /// True when more eligible records may exist beyond this batch.
    pub fn limit_reached(&self) -> bool {
        self.weight_limit || self.count_limit
    }

    /// Whether the removal stopped for this particular reason.
    pub fn stopped_by(&self, reason: LimitReason) -> bool {
        match reason {
            LimitReason::Weight => self.weight_limit,
            LimitReason::Count => self.count_limit,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Sum of the weights of the records in the batch.
    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn compaction_boundary(&self) -> u64 {
        self.compaction_boundary
    }

    /// Key of the last record in the batch.
    pub fn last_key(&self) -> Option<u64> {
        self.records.last().map(|record| record.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: u64, weight: u64) -> Record {
        Record::new(key, "write", Vec::new()).with_weight(weight)
    }

    #[test]
    fn test_weight_accumulates() {
        let mut batch = WeightedBatch::new(u64::MAX);
        batch.push(record(1, 3)).unwrap();
        batch.push(record(2, 4)).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.weight(), 7);
        assert_eq!(batch.last_key(), Some(2));
        assert!(!batch.limit_reached());
    }

    #[test]
    fn test_boundary_rejects_record() {
        let mut batch = WeightedBatch::new(5);
        batch.push(record(5, 1)).unwrap();
        let rejected = batch.push(record(6, 1)).unwrap_err();
        assert_eq!(rejected.key, 6);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.weight(), 1);
    }

    #[test]
    fn test_limit_reasons_are_independent() {
        let mut batch = WeightedBatch::new(u64::MAX);
        batch.mark_limit(LimitReason::Count);
        assert!(batch.limit_reached());
        assert!(batch.stopped_by(LimitReason::Count));
        assert!(!batch.stopped_by(LimitReason::Weight));

        batch.mark_limit(LimitReason::Weight);
        assert!(batch.stopped_by(LimitReason::Weight));
        assert!(batch.stopped_by(LimitReason::Count));
    }

    #[test]
    fn test_empty_batch() {
        let batch = WeightedBatch::new(10);
        assert!(batch.is_empty());
        assert_eq!(batch.weight(), 0);
        assert_eq!(batch.compaction_boundary(), 10);
        assert!(batch.into_records().is_empty());
    }
}
