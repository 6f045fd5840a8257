// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persisted row layout and the glue between records, codecs and media.
//
// One row per record, keyed by the record key:
//
// | column         | meaning                                  |
// |----------------|------------------------------------------|
// | key            | log position (primary key)               |
// | weight         | record weight, readable undecoded        |
// | type           | codec discriminator                      |
// | operation_kind | producer-defined operation tag           |
// | correlation_id | id of the originating operation          |
// | payload        | codec-serialized record                  |
//
// Key-value media (redb) store the non-key columns packed into one value:
//   [8 bytes: weight (u64)]
//   [4 bytes: type_len (u32)]           [N bytes: type]
//   [4 bytes: operation_kind_len (u32)] [N bytes: operation_kind]
//   [4 bytes: correlation_id_len (u32)] [N bytes: correlation_id]
//   [4 bytes: payload_len (u32)]        [M bytes: payload]

use crate::codec::RecordCodec;
use crate::error::{CodecError, StorageError};
use crate::record::Record;

/// One persisted backlog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Log position of the record held by this row.
    pub key: u64,
    /// Weight of the record, kept outside the payload so a row that no
    /// longer decodes can still be accounted for.
    pub weight: u64,
    /// Codec discriminator.
    pub type_tag: String,
    /// Producer-defined operation tag.
    pub operation_kind: String,
    /// Correlation id in its hyphenated text form.
    pub correlation_id: String,
    /// Codec-serialized record.
    pub payload: Vec<u8>,
}

impl Row {
    /// Build the row for `record` using the store's codec.
    pub fn from_record(codec: &dyn RecordCodec, record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            key: record.key,
            weight: record.weight,
            type_tag: codec.type_tag().to_string(),
            operation_kind: record.operation.clone(),
            correlation_id: record.correlation_id.to_string(),
            payload: codec.serialize(record)?,
        })
    }

    /// Decode the record held in the payload column.
    ///
    /// A payload whose embedded key disagrees with the row key is reported
    /// as a codec failure, like any other unreadable payload.
    pub fn decode_record(&self, codec: &dyn RecordCodec) -> Result<Record, CodecError> {
        let record = codec.deserialize(&self.payload)?;
        if record.key != self.key {
            return Err(CodecError::KeyMismatch {
                row: self.key,
                record: record.key,
            });
        }
        Ok(record)
    }

    /// Bytes this row occupies once packed, key included.
    pub fn encoded_len(&self) -> usize {
        8 + 8 + 4 * 4
            + self.type_tag.len()
            + self.operation_kind.len()
            + self.correlation_id.len()
            + self.payload.len()
    }

    /// Pack the non-key columns into a single value.
    pub fn encode_columns(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len() - 8);
        out.extend_from_slice(&self.weight.to_le_bytes());
        for column in [
            self.type_tag.as_bytes(),
            self.operation_kind.as_bytes(),
            self.correlation_id.as_bytes(),
            self.payload.as_slice(),
        ] {
            out.extend_from_slice(&(column.len() as u32).to_le_bytes());
            out.extend_from_slice(column);
        }
        out
    }

    /// Unpack a value produced by [`Row::encode_columns`].
    ///
    /// A malformed envelope means the medium itself is damaged, so this
    /// reports `CorruptedData` rather than a codec error.
    pub fn decode_columns(key: u64, bytes: &[u8]) -> Result<Self, StorageError> {
        let weight_bytes: [u8; 8] = bytes
            .get(..8)
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| StorageError::CorruptedData(format!("row {key}: truncated weight")))?;
        let weight = u64::from_le_bytes(weight_bytes);
        let mut offset = 8usize;
        let text = |name: &str, raw: &[u8]| {
            String::from_utf8(raw.to_vec()).map_err(|e| {
                StorageError::CorruptedData(format!("row {key}: {name} column: {e}"))
            })
        };

        let type_tag = text("type", read_column(bytes, &mut offset, key, "type")?)?;
        let operation_kind = text(
            "operation_kind",
            read_column(bytes, &mut offset, key, "operation_kind")?,
        )?;
        let correlation_id = text(
            "correlation_id",
            read_column(bytes, &mut offset, key, "correlation_id")?,
        )?;
        let payload = read_column(bytes, &mut offset, key, "payload")?.to_vec();

        Ok(Self {
            key,
            weight,
            type_tag,
            operation_kind,
            correlation_id,
            payload,
        })
    }
}

/// Read one length-prefixed column starting at `offset`.
fn read_column<'a>(
    bytes: &'a [u8],
    offset: &mut usize,
    key: u64,
    name: &str,
) -> Result<&'a [u8], StorageError> {
    let corrupted = || StorageError::CorruptedData(format!("row {key}: truncated {name} column"));
    let len_end = offset
        .checked_add(4)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(corrupted)?;
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[*offset..len_end]);
    let len = u32::from_le_bytes(len_bytes) as usize;
    let end = len_end
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(corrupted)?;
    *offset = end;
    Ok(&bytes[len_end..end])
}
