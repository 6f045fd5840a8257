// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory staging area for the newest, not yet flushed records.

use std::collections::VecDeque;

use crate::record::Record;

/// Ordered records plus their running weight.
///
/// Owned exclusively by [`crate::BufferedLog`], which enforces key order
/// before records reach the buffer.
#[derive(Debug, Default)]
pub struct Buffer {
    records: VecDeque<Record>,
    weight: u64,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record at the tail.
    pub fn push_back(&mut self, record: Record) {
        self.weight = self.weight.saturating_add(record.weight);
        self.records.push_back(record);
    }

    /// Put a record back at the head.
    pub fn push_front(&mut self, record: Record) {
        self.weight = self.weight.saturating_add(record.weight);
        self.records.push_front(record);
    }

    /// Take the record at the head.
    pub fn pop_front(&mut self) -> Option<Record> {
        let record = self.records.pop_front()?;
        self.weight = self.weight.saturating_sub(record.weight);
        Some(record)
    }

    /// Take the record at the tail.
    pub fn pop_back(&mut self) -> Option<Record> {
        let record = self.records.pop_back()?;
        self.weight = self.weight.saturating_sub(record.weight);
        Some(record)
    }

    /// Drop records at the tail until `len` remain.
    pub fn truncate(&mut self, len: usize) {
        while self.records.len() > len {
            self.pop_back();
        }
    }

    /// Remove up to `n` records from the head. Returns how many went.
    pub fn drain_front(&mut self, n: u64) -> u64 {
        let mut removed = 0;
        while removed < n && self.pop_front().is_some() {
            removed += 1;
        }
        removed
    }

    /// Remove every record with `from <= key <= to`.
    pub fn remove_range(&mut self, from: u64, to: u64) -> u64 {
        let before = self.records.len();
        let mut removed_weight = 0u64;
        self.records.retain(|record| {
            let doomed = (from..=to).contains(&record.key);
            if doomed {
                removed_weight = removed_weight.saturating_add(record.weight);
            }
            !doomed
        });
        self.weight = self.weight.saturating_sub(removed_weight);
        (before - self.records.len()) as u64
    }

    pub fn front(&self) -> Option<&Record> {
        self.records.front()
    }

    pub fn back(&self) -> Option<&Record> {
        self.records.back()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// All records as one slice, in key order.
    pub fn make_contiguous(&mut self) -> &[Record] {
        self.records.make_contiguous()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.weight = 0;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of the weights of the buffered records.
    pub fn weight(&self) -> u64 {
        self.weight
    }
}
