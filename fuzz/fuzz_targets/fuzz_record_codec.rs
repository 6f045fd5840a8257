// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for backlog record decoding and row envelopes

#![no_main]

use libfuzzer_sys::fuzz_target;
use verisim_backlog::row::Row;
use verisim_backlog::{BinaryCodec, JsonCodec, RecordCodec};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must fail cleanly, never panic
    if let Ok(record) = BinaryCodec.deserialize(data) {
        // Anything that decodes must survive another round trip
        let encoded = BinaryCodec.serialize(&record).expect("decoded record re-encodes");
        let again = BinaryCodec.deserialize(&encoded).expect("re-encoded record decodes");
        assert_eq!(again, record);
    }
    let _ = JsonCodec.deserialize(data);

    // Damaged row envelopes surface as storage corruption
    if let Ok(row) = Row::decode_columns(0, data) {
        let _ = row.decode_record(&BinaryCodec);
    }
});
