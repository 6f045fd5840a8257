// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Record codecs for the durable tier.
//
// A store instance owns exactly one codec, fixed at construction. Decoding
// failures surface as `CodecError` so the tier can skip one unreadable row
// without treating the whole medium as broken.
//
// Binary format (all integers little-endian):
//   [4 bytes: crc32]               -- CRC32 of all bytes after this field
//   [8 bytes: key (u64)]
//   [8 bytes: weight (u64)]
//   [16 bytes: correlation id]
//   [4 bytes: operation_len (u32)]
//   [N bytes: operation]           -- UTF-8
//   [4 bytes: payload_len (u32)]
//   [M bytes: payload]

use crc32fast::Hasher as Crc32Hasher;
use uuid::Uuid;

use crate::error::CodecError;
use crate::record::Record;

/// Maximum encoded record size: 64 MiB. Larger declared lengths are
/// treated as corruption.
pub const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Size of the fixed fields after the CRC (key + weight + correlation id).
const FIXED_FIELDS_SIZE: usize = 8 + 8 + 16;

/// Converts records to and from the bytes stored in the payload column.
pub trait RecordCodec: Send + Sync {
    /// Discriminator written to the `type` column of every row.
    fn type_tag(&self) -> &'static str;

    /// Encode a record.
    fn serialize(&self, record: &Record) -> Result<Vec<u8>, CodecError>;

    /// Decode a record previously produced by [`RecordCodec::serialize`].
    fn deserialize(&self, bytes: &[u8]) -> Result<Record, CodecError>;
}

// ---------------------------------------------------------------------------
// BinaryCodec
// ---------------------------------------------------------------------------

/// Compact, CRC32-protected binary codec. The default for durable tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl RecordCodec for BinaryCodec {
    fn type_tag(&self) -> &'static str {
        "binary-v1"
    }

    fn serialize(&self, record: &Record) -> Result<Vec<u8>, CodecError> {
        let operation = record.operation.as_bytes();
        let inner_size = FIXED_FIELDS_SIZE + 4 + operation.len() + 4 + record.payload.len();
        if inner_size as u64 > MAX_RECORD_SIZE as u64 {
            return Err(CodecError::TooLarge {
                length: inner_size as u64,
                max: MAX_RECORD_SIZE as u64,
            });
        }

        let mut inner = Vec::with_capacity(inner_size);
        inner.extend_from_slice(&record.key.to_le_bytes());
        inner.extend_from_slice(&record.weight.to_le_bytes());
        inner.extend_from_slice(record.correlation_id.as_bytes());
        inner.extend_from_slice(&(operation.len() as u32).to_le_bytes());
        inner.extend_from_slice(operation);
        inner.extend_from_slice(&(record.payload.len() as u32).to_le_bytes());
        inner.extend_from_slice(&record.payload);

        let crc = compute_crc32(&inner);
        let mut buffer = Vec::with_capacity(4 + inner.len());
        buffer.extend_from_slice(&crc.to_le_bytes());
        buffer.extend_from_slice(&inner);
        Ok(buffer)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Record, CodecError> {
        let mut reader = FieldReader::new(bytes);
        let stored_crc = reader.u32()?;
        let inner = reader.rest();

        let computed_crc = compute_crc32(inner);
        if stored_crc != computed_crc {
            return Err(CodecError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let mut reader = FieldReader::new(inner);
        let key = reader.u64()?;
        let weight = reader.u64()?;
        let correlation_id = Uuid::from_bytes(reader.array::<16>()?);
        let operation_len = reader.length()?;
        let operation = String::from_utf8(reader.take(operation_len)?.to_vec())?;
        let payload_len = reader.length()?;
        let payload = reader.take(payload_len)?.to_vec();

        Ok(Record {
            key,
            weight,
            operation,
            correlation_id,
            payload,
        })
    }
}

/// Compute a CRC32 checksum (IEEE polynomial) over the given bytes.
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Bounds-checked little-endian field reader.
struct FieldReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof(self.offset as u64))?;
        let data: &'a [u8] = self.data;
        let slice = &data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array::<4>()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array::<8>()?))
    }

    /// A u32 length prefix, validated against [`MAX_RECORD_SIZE`].
    fn length(&mut self) -> Result<usize, CodecError> {
        let length = self.u32()?;
        if length > MAX_RECORD_SIZE {
            return Err(CodecError::TooLarge {
                length: length as u64,
                max: MAX_RECORD_SIZE as u64,
            });
        }
        Ok(length as usize)
    }

    fn rest(&mut self) -> &'a [u8] {
        let data: &'a [u8] = self.data;
        let rest = &data[self.offset..];
        self.offset = data.len();
        rest
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// Human-readable JSON codec, useful when rows are inspected by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RecordCodec for JsonCodec {
    fn type_tag(&self) -> &'static str {
        "json-v1"
    }

    fn serialize(&self, record: &Record) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(record)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Record, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
