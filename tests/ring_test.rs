/*!
 * Ring Buffer Tests
 */

use proptest::prelude::*;
use std::sync::Arc;
use weft_capture::{BufferError, BufferId, EventRing, OverflowPolicy, Payload, ProducerId, RawEvent};

fn event(tag: u64) -> RawEvent {
    RawEvent::new(
        ProducerId(tag),
        Payload::CallEntry {
            function: format!("fn_{tag}").into(),
            args_preview: "".into(),
            truncated: false,
        },
    )
}

#[test]
fn test_reads_return_writes_in_order() {
    let ring = EventRing::new(BufferId(0), 64, OverflowPolicy::DropOldest);
    let cursor = ring.cursor();

    for i in 0..50 {
        ring.write(event(i)).unwrap();
    }

    let batch = ring.read_batch(&cursor, 64).unwrap();
    assert_eq!(batch.gap, 0);
    assert_eq!(batch.events.len(), 50);
    for (i, ev) in batch.events.iter().enumerate() {
        assert_eq!(ev.producer, ProducerId(i as u64));
        assert_eq!(ev.sequence, i as u64);
    }
}

#[test]
fn test_overflow_drop_oldest_accounting() {
    // Capacity 1024, write 2000: the newest 1024 survive and the observed
    // gap plus the observed events always account for every write
    let ring = EventRing::new(BufferId(0), 1024, OverflowPolicy::DropOldest);
    let cursor = ring.cursor();

    for i in 0..2000 {
        ring.write(event(i)).unwrap();
    }

    let batch = ring.read_batch(&cursor, 4096).unwrap();
    assert_eq!(batch.events.len(), 1024);
    assert_eq!(batch.gap, 2000 - 1024);
    assert_eq!(batch.events.len() as u64 + batch.gap, 2000);

    // A single contiguous gap: survivors start right where the gap ends
    assert_eq!(batch.events[0].sequence, batch.gap);
    let sequences: Vec<u64> = batch.events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (batch.gap..2000).collect::<Vec<_>>());

    // The ring's dropped counter incremented by exactly the gap
    assert_eq!(ring.stats().dropped, batch.gap);
}

#[test]
fn test_reject_policy_full_then_recovers() {
    let ring = EventRing::new(BufferId(0), 8, OverflowPolicy::Reject);
    let cursor = ring.cursor();

    for i in 0..8 {
        ring.write(event(i)).unwrap();
    }
    assert!(matches!(ring.write(event(99)), Err(BufferError::Full(_))));

    let drained = ring.read_batch(&cursor, 4).unwrap();
    assert_eq!(drained.events.len(), 4);
    for i in 0..4 {
        ring.write(event(100 + i)).unwrap();
    }
    assert!(matches!(ring.write(event(999)), Err(BufferError::Full(_))));
    assert_eq!(ring.stats().rejected, 2);
}

#[test]
fn test_block_policy_waits_for_reader() {
    let ring = Arc::new(EventRing::new(BufferId(0), 4, OverflowPolicy::Block));
    let cursor = ring.cursor();

    for i in 0..4 {
        ring.write(event(i)).unwrap();
    }

    let writer_ring = Arc::clone(&ring);
    let writer = std::thread::spawn(move || writer_ring.write(event(42)).unwrap());

    // Give the writer time to start spinning, then free a slot
    std::thread::sleep(std::time::Duration::from_millis(20));
    let _ = ring.read(&cursor).unwrap().unwrap();

    let position = writer.join().unwrap();
    assert_eq!(position, 4);
}

#[test]
fn test_destroy_invalidates_outstanding_cursors() {
    let ring = EventRing::new(BufferId(0), 8, OverflowPolicy::DropOldest);
    let cursor_a = ring.cursor();
    let cursor_b = ring.cursor();
    ring.write(event(1)).unwrap();

    ring.destroy();

    assert_eq!(ring.read(&cursor_a), Err(BufferError::Destroyed));
    assert_eq!(ring.read(&cursor_b), Err(BufferError::Destroyed));
}

#[test]
fn test_concurrent_producers_no_loss_under_capacity() {
    let ring = Arc::new(EventRing::new(BufferId(0), 4096, OverflowPolicy::DropOldest));
    let mut writers = Vec::new();

    for t in 0..8u64 {
        let ring = Arc::clone(&ring);
        writers.push(std::thread::spawn(move || {
            for i in 0..400 {
                ring.write(event(t * 10_000 + i)).unwrap();
            }
        }));
    }
    for writer in writers {
        writer.join().unwrap();
    }

    let cursor = ring.cursor();
    let batch = ring.read_batch(&cursor, 4096).unwrap();
    assert_eq!(batch.events.len(), 3200);
    assert_eq!(batch.gap, 0);

    // No duplicates, cursor order == sequence order
    let sequences: Vec<u64> = batch.events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..3200).collect::<Vec<_>>());
}

proptest! {
    /// For any write sequence under capacity, read_batch returns exactly the
    /// written events, in write order, with no duplicates
    #[test]
    fn prop_under_capacity_roundtrip(tags in prop::collection::vec(0u64..1000, 0..256)) {
        let ring = EventRing::new(BufferId(0), 256, OverflowPolicy::DropOldest);
        let cursor = ring.cursor();

        for &tag in &tags {
            ring.write(event(tag)).unwrap();
        }

        let batch = ring.read_batch(&cursor, 256).unwrap();
        prop_assert_eq!(batch.gap, 0);
        prop_assert_eq!(batch.events.len(), tags.len());
        for (ev, &tag) in batch.events.iter().zip(tags.iter()) {
            prop_assert_eq!(ev.producer, ProducerId(tag));
        }
    }

    /// Writing past capacity always satisfies: observed + gap == written
    #[test]
    fn prop_overflow_accounting(extra in 1usize..600) {
        let capacity = 128;
        let total = capacity + extra;
        let ring = EventRing::new(BufferId(0), capacity, OverflowPolicy::DropOldest);
        let cursor = ring.cursor();

        for i in 0..total {
            ring.write(event(i as u64)).unwrap();
        }

        let batch = ring.read_batch(&cursor, total).unwrap();
        prop_assert_eq!(batch.events.len(), capacity);
        prop_assert_eq!(batch.events.len() as u64 + batch.gap, total as u64);
    }
}
