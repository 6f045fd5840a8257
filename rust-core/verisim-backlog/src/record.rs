// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The unit of the replication backlog: one committed operation awaiting
// transmission to a backup or mirror replica.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable, committed operation in the backlog.
///
/// Keys are assigned by the producer and must be strictly increasing across
/// the whole log. The weight is an abstract cost unit (typically the
/// serialized size) used to bound the in-memory buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Log position. Unique and strictly increasing.
    pub key: u64,

    /// Cost of holding this record, used by the buffer and batch limits.
    pub weight: u64,

    /// Producer-defined operation tag (e.g. "write", "remove", "evict").
    pub operation: String,

    /// Opaque id correlating this record with the originating operation.
    pub correlation_id: Uuid,

    /// Opaque operation payload.
    pub payload: Vec<u8>,
}

impl Record {
    /// Create a record weighted by its payload size, with a fresh
    /// correlation id.
    pub fn new(key: u64, operation: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key,
            weight: payload.len() as u64,
            operation: operation.into(),
            correlation_id: Uuid::new_v4(),
            payload,
        }
    }

    /// Override the weight derived from the payload size.
    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    /// Attach an existing correlation id.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}
