// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error types for the VeriSimDB replication backlog.
//
// Three layers, three enums:
//
// - `StorageError` is what a durable medium reports (I/O, full, corrupted).
// - `CodecError` is a record that could not be decoded. It is deliberately
//   separate so the durable tier can skip a single unreadable record and keep
//   draining the rest of the backlog.
// - `BacklogError` is what callers of the log see. Conversion from
//   `StorageError` keeps "storage full" and "integrity compromised" distinct
//   from a generic storage failure.

use std::string::FromUtf8Error;

use thiserror::Error;

/// Errors reported by a durable medium.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The medium is not available (connection lost, lock poisoned, ...).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The medium has no room for the requested write.
    #[error("storage full: {requested} bytes requested, {available} bytes available")]
    Full {
        /// Bytes the write needed.
        requested: u64,
        /// Bytes still free on the medium.
        available: u64,
    },

    /// The backlog table has not been created (or was dropped).
    #[error("table missing: {0}")]
    TableMissing(String),

    /// The medium was released and can no longer be used.
    #[error("medium closed")]
    Closed,
}

/// A single record could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    /// CRC32 checksum mismatch over the encoded record.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// The CRC32 stored alongside the record.
        expected: u32,
        /// The CRC32 computed from the bytes read back.
        actual: u32,
    },

    /// The encoded record ended before all fields were read.
    #[error("unexpected end of record at offset {0}")]
    UnexpectedEof(u64),

    /// The encoded record declares a length above the allowed maximum.
    #[error("record declares {length} bytes, exceeding maximum {max}")]
    TooLarge {
        /// Declared length.
        length: u64,
        /// Maximum accepted length.
        max: u64,
    },

    /// The operation tag is not valid UTF-8.
    #[error("invalid operation tag: {0}")]
    InvalidOperation(#[from] FromUtf8Error),

    /// The decoded record carries a different key than the row holding it.
    #[error("record key {record} does not match row key {row}")]
    KeyMismatch {
        /// Key of the persisted row.
        row: u64,
        /// Key found inside the decoded payload.
        record: u64,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by the backlog and its durable tier.
#[derive(Debug, Error)]
pub enum BacklogError {
    /// The durable medium failed; the operation was not applied.
    #[error("storage failure: {0}")]
    Storage(StorageError),

    /// The durable medium has no room for the append.
    #[error("storage full: {requested} bytes requested, {available} bytes available")]
    StorageFull {
        /// Bytes the append needed.
        requested: u64,
        /// Bytes still free on the medium.
        available: u64,
    },

    /// Structural corruption was detected. The log must not be used further
    /// and should be rebuilt from a full resynchronization.
    #[error("integrity compromised: {0}")]
    IntegrityCompromised(String),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The durable tier does not support this operation.
    #[error("operation not supported by this tier: {0}")]
    Unsupported(&'static str),

    /// A record key did not follow the last key of the log.
    #[error("key {key} is not greater than last key {last}")]
    OutOfOrder {
        /// The rejected key.
        key: u64,
        /// The newest key already in the log.
        last: u64,
    },

    /// The backlog configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tier was closed and is no longer usable.
    #[error("backlog closed")]
    Closed,
}

impl From<StorageError> for BacklogError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Full {
                requested,
                available,
            } => BacklogError::StorageFull {
                requested,
                available,
            },
            StorageError::CorruptedData(msg) => BacklogError::IntegrityCompromised(msg),
            StorageError::Closed => BacklogError::Closed,
            other => BacklogError::Storage(other),
        }
    }
}

/// Convenience type alias for backlog results.
pub type BacklogResult<T> = Result<T, BacklogError>;
