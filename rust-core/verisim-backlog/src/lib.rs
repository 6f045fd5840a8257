// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// VeriSimDB Replication Backlog
//
// A durable, strictly ordered log of committed operations awaiting
// transmission to a backup or mirror replica. Producers append records as
// operations commit; the replication layer drains them from the head once a
// replica acknowledged them, or compacts obsolete ranges away.
//
// The log is split in two tiers with no gap and no overlap:
//
//   oldest ──► [ durable tier (TableTier over a TableMedium) ][ buffer ] ◄── newest
//
// # Modules
//
// - [`record`] -- The `Record` unit (key, weight, operation tag, payload).
// - [`codec`] -- `RecordCodec` with a CRC32-protected binary and a JSON codec.
// - [`row`] -- Persisted row layout and the record/codec/medium glue.
// - [`medium`] -- `TableMedium` with in-memory and redb implementations.
// - [`tier`] -- The `DurableTier` contract and `TableTier`.
// - [`buffer`] -- The weighted in-memory write buffer.
// - [`batch`] -- `WeightedBatch`, the result of a removal.
// - [`log`] -- `BufferedLog`, the flush policy and removal algorithm.
// - [`cursor`] -- `LogCursor`, iteration across both tiers.
// - [`stats`] -- Lock-free size and weight accounting.
// - [`config`] -- `BacklogConfig`.
// - [`error`] -- Error taxonomy.
//
// # Example
//
// ```rust
// use verisim_backlog::{BacklogConfig, BufferedLog, Record, TableTier};
//
// let config = BacklogConfig::with_capacity(1024);
// let tier = TableTier::redb("/var/lib/verisim/backlog.redb", &config)?;
// let mut log = BufferedLog::new(tier, config)?;
//
// log.append(Record::new(1, "write", payload))?;
// for record in log.read_only_iterator(0) {
//     ship(record?);
// }
// let acked = log.remove_first_batch(4096, last_acked_key)?;
// ```

pub mod batch;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod log;
pub mod medium;
pub mod record;
pub mod row;
pub mod stats;
pub mod tier;

// Re-export the most commonly used types at the crate root for convenience.
pub use batch::{LimitReason, WeightedBatch};
pub use buffer::Buffer;
pub use codec::{BinaryCodec, JsonCodec, RecordCodec};
pub use config::BacklogConfig;
pub use cursor::{CursorState, LogCursor};
pub use error::{BacklogError, BacklogResult, CodecError, StorageError};
pub use log::BufferedLog;
pub use medium::memory::MemoryMedium;
pub use medium::{SpaceUsage, TableMedium};
pub use record::Record;
pub use stats::{BacklogStats, SizeProbe};
pub use tier::{DurableTier, ScanPage, TableTier};

#[cfg(feature = "redb-backend")]
pub use medium::redb_medium::RedbMedium;
