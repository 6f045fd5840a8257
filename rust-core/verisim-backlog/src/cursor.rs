// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Read-only cursor stitching the durable tier and the in-memory buffer.
//
// The cursor pages through the durable tier until it runs dry, then walks the
// buffer. Every durable key is below every buffered key, so switching over at
// the exact point the durable scan is exhausted neither repeats nor skips a
// key.

use std::collections::VecDeque;

use crate::buffer::Buffer;
use crate::error::BacklogResult;
use crate::record::Record;
use crate::tier::DurableTier;

/// Where the cursor is reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    ScanningDurable,
    ScanningBuffer,
    Exhausted,
}

/// Forward iterator over the log, durable records first.
///
/// Yields `Err` once if a durable page cannot be read, then stops. Records
/// whose payload cannot be decoded are skipped by the tier.
pub struct LogCursor<'a, T: DurableTier> {
    tier: &'a T,
    buffer: &'a Buffer,
    state: CursorState,
    page: VecDeque<Record>,
    next_key: Option<u64>,
    pending_skip: usize,
    page_size: usize,
    buffer_pos: usize,
}

impl<'a, T: DurableTier> LogCursor<'a, T> {
    /// Cursor starting at position `skip` of the durable tier.
    pub(crate) fn durable(tier: &'a T, buffer: &'a Buffer, skip: usize, page_size: usize) -> Self {
        Self {
            tier,
            buffer,
            state: CursorState::ScanningDurable,
            page: VecDeque::new(),
            next_key: Some(0),
            pending_skip: skip,
            page_size: page_size.max(1),
            buffer_pos: 0,
        }
    }

    /// Cursor over the buffer only, starting at `offset`.
    pub(crate) fn buffer_only(tier: &'a T, buffer: &'a Buffer, offset: usize) -> Self {
        Self {
            tier,
            buffer,
            state: CursorState::ScanningBuffer,
            page: VecDeque::new(),
            next_key: None,
            pending_skip: 0,
            page_size: 1,
            buffer_pos: offset,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Release the current durable page. The cursor yields nothing further.
    pub fn close(&mut self) {
        self.page.clear();
        self.next_key = None;
        self.state = CursorState::Exhausted;
    }

    fn fetch_page(&mut self, from_key: u64) -> BacklogResult<()> {
        let page = self.tier.scan(from_key, self.pending_skip, self.page_size)?;
        self.pending_skip = 0;
        self.next_key = page.next_key;
        self.page.extend(page.records);
        Ok(())
    }
}

impl<'a, T: DurableTier> Iterator for LogCursor<'a, T> {
    type Item = BacklogResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                CursorState::ScanningDurable => {
                    if let Some(record) = self.page.pop_front() {
                        return Some(Ok(record));
                    }
                    match self.next_key {
                        Some(from_key) => {
                            if let Err(e) = self.fetch_page(from_key) {
                                self.close();
                                return Some(Err(e));
                            }
                        }
                        None => self.state = CursorState::ScanningBuffer,
                    }
                }
                CursorState::ScanningBuffer => match self.buffer.get(self.buffer_pos) {
                    Some(record) => {
                        self.buffer_pos += 1;
                        return Some(Ok(record.clone()));
                    }
                    None => self.state = CursorState::Exhausted,
                },
                CursorState::Exhausted => return None,
            }
        }
    }
}

impl<'a, T: DurableTier> std::fmt::Debug for LogCursor<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCursor")
            .field("tier", &self.tier.name())
            .field("state", &self.state)
            .field("buffered_page", &self.page.len())
            .field("next_key", &self.next_key)
            .field("buffer_pos", &self.buffer_pos)
            .finish()
    }
}
