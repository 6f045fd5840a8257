// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for the replication backlog

use std::collections::VecDeque;

use proptest::prelude::*;
use verisim_backlog::{
    BacklogConfig, BinaryCodec, BufferedLog, JsonCodec, MemoryMedium, Record, RecordCodec,
    TableTier,
};

#[derive(Debug, Clone)]
enum Op {
    Append(u64),
    AppendBatch(Vec<u64>),
    Remove { capacity: u64, boundary_offset: u64 },
    Delete(u64),
    Flush,
}

/// Generate arbitrary record weights
fn arb_weight() -> impl Strategy<Value = u64> {
    0u64..12
}

/// Generate arbitrary log operations
fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => arb_weight().prop_map(Op::Append),
        2 => prop::collection::vec(arb_weight(), 0..6).prop_map(Op::AppendBatch),
        2 => (0u64..16, 0u64..8).prop_map(|(capacity, boundary_offset)| Op::Remove {
            capacity,
            boundary_offset,
        }),
        1 => (0u64..6).prop_map(Op::Delete),
        1 => Just(Op::Flush),
    ]
}

/// Generate arbitrary records
fn arb_record() -> impl Strategy<Value = Record> {
    (
        any::<u64>(),
        any::<u64>(),
        "[a-z]{0,12}",
        prop::collection::vec(any::<u8>(), 0..256),
    )
        .prop_map(|(key, weight, operation, payload)| {
            Record::new(key, operation, payload).with_weight(weight)
        })
}

fn new_log(capacity: u64, page: usize) -> BufferedLog<TableTier<MemoryMedium>> {
    let config = BacklogConfig {
        buffer_capacity: capacity,
        cursor_page_size: page,
        ..Default::default()
    };
    let tier = TableTier::in_memory(&config).unwrap();
    BufferedLog::new(tier, config).unwrap()
}

proptest! {
    #[test]
    fn test_log_matches_fifo_model(
        capacity in 1u64..20,
        page in 1usize..5,
        ops in prop::collection::vec(arb_op(), 1..60)
    ) {
        let mut log = new_log(capacity, page);
        let mut model: VecDeque<u64> = VecDeque::new();
        let mut next_key = 1u64;

        for op in ops {
            match op {
                Op::Append(weight) => {
                    log.append(Record::new(next_key, "write", Vec::new()).with_weight(weight)).unwrap();
                    model.push_back(next_key);
                    next_key += 1;
                }
                Op::AppendBatch(weights) => {
                    let records: Vec<Record> = weights
                        .iter()
                        .enumerate()
                        .map(|(i, w)| Record::new(next_key + i as u64, "write", Vec::new()).with_weight(*w))
                        .collect();
                    for record in &records {
                        model.push_back(record.key);
                    }
                    next_key += records.len() as u64;
                    log.append_batch(records).unwrap();
                }
                Op::Remove { capacity, boundary_offset } => {
                    let boundary = model
                        .front()
                        .map_or(0, |oldest| oldest + boundary_offset);
                    let batch = log.remove_first_batch(capacity, boundary).unwrap();

                    // Removal drains a prefix of the log, never past the boundary.
                    for record in batch.records() {
                        prop_assert!(record.key <= boundary);
                        prop_assert_eq!(Some(record.key), model.pop_front());
                    }
                    let weight: u64 = batch.records().iter().map(|r| r.weight).sum();
                    prop_assert_eq!(batch.weight(), weight);
                }
                Op::Delete(n) => {
                    let expected = n.min(model.len() as u64);
                    prop_assert_eq!(log.delete_oldest_packets(n).unwrap(), expected);
                    for _ in 0..expected {
                        model.pop_front();
                    }
                }
                Op::Flush => {
                    log.flush_buffer().unwrap();
                    prop_assert_eq!(log.memory_packets_count(), 0);
                }
            }

            // Count conservation across both tiers.
            prop_assert_eq!(log.size(), model.len() as u64);
            prop_assert_eq!(
                log.size(),
                log.memory_packets_count() + log.external_packets_count()
            );
            prop_assert_eq!(
                log.weight(),
                log.memory_packets_weight() + log.external_storage_packets_weight()
            );
        }

        // Ordering: strictly ascending, no gaps relative to the survivors.
        let keys: Vec<u64> = log.read_only_iterator(0).map(|r| r.unwrap().key).collect();
        prop_assert_eq!(keys, model.iter().copied().collect::<Vec<_>>());
        log.validate_integrity().unwrap();
    }

    #[test]
    fn test_iterator_from_any_index(
        capacity in 1u64..10,
        count in 0u64..30,
        from in 0u64..35
    ) {
        let mut log = new_log(capacity, 3);
        for key in 1..=count {
            log.append(Record::new(key, "write", Vec::new()).with_weight(1)).unwrap();
        }

        let keys: Vec<u64> = log.read_only_iterator(from).map(|r| r.unwrap().key).collect();
        let expected: Vec<u64> = (1..=count).skip(from as usize).collect();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn test_buffer_weight_bounded_after_append(
        capacity in 1u64..50,
        weights in prop::collection::vec(0u64..30, 1..40)
    ) {
        let mut log = new_log(capacity, 8);
        for (i, weight) in weights.iter().enumerate() {
            log.append(Record::new(i as u64 + 1, "write", Vec::new()).with_weight(*weight)).unwrap();
            prop_assert!(log.memory_packets_weight() < capacity);
        }
    }

    #[test]
    fn test_binary_codec_round_trip(record in arb_record()) {
        let bytes = BinaryCodec.serialize(&record).unwrap();
        prop_assert_eq!(BinaryCodec.deserialize(&bytes).unwrap(), record);
    }

    #[test]
    fn test_json_codec_round_trip(record in arb_record()) {
        let bytes = JsonCodec.serialize(&record).unwrap();
        prop_assert_eq!(JsonCodec.deserialize(&bytes).unwrap(), record);
    }

    #[test]
    fn test_codecs_reject_garbage_without_panicking(
        bytes in prop::collection::vec(any::<u8>(), 0..128)
    ) {
        let _ = BinaryCodec.deserialize(&bytes);
        let _ = JsonCodec.deserialize(&bytes);
    }
}
