//! Property-based tests for the ring's sequencing protocol.
//!
//! Verifies the invariants documented in `ring.rs`'s memory-ordering notes hold
//! under randomized sequences of reserve/commit/consume operations.

use proptest::prelude::*;
use pktring::{Config, Ring};
use std::mem::MaybeUninit;

// =============================================================================
// Bounded count: 0 <= (tail - head) <= capacity
// =============================================================================

proptest! {
    /// Ring never exceeds capacity after any sequence of operations
    #[test]
    fn prop_bounded_count_ring(
        writes in 0usize..100,
        reads in 0usize..100,
    ) {
        let config = Config::default(); // 64K capacity
        let ring = Ring::<u64>::new(config);
        let capacity = ring.capacity();

        let actual_writes = writes.min(capacity);
        for i in 0..actual_writes {
            if let Some(mut r) = ring.reserve(1) {
                r.as_mut_slice()[0] = MaybeUninit::new(i as u64);
                r.commit();
            }
        }

        prop_assert!(ring.len() <= capacity,
            "len {} > capacity {}", ring.len(), capacity);

        let mut read_count = 0;
        let _target_reads = reads.min(actual_writes);
        ring.consume_batch(|_| {
            read_count += 1;
        });

        prop_assert!(ring.len() <= capacity,
            "len {} > capacity {} after reads", ring.len(), capacity);
        prop_assert!(read_count <= actual_writes,
            "read more than written: {} > {}", read_count, actual_writes);
    }
}

// =============================================================================
// Monotonic progress: len() increases on write, decreases on consume
// =============================================================================

proptest! {
    #[test]
    fn prop_monotonic_progress(
        ops in prop::collection::vec(prop::bool::ANY, 1..50),
    ) {
        let ring = Ring::<u64>::new(Config::default());

        for write_op in ops {
            let len_before = ring.len();

            if write_op {
                if let Some(mut r) = ring.reserve(1) {
                    r.as_mut_slice()[0] = MaybeUninit::new(42);
                    r.commit();
                    let len_after = ring.len();
                    prop_assert!(len_after == len_before + 1,
                        "len didn't increase after successful write: {} -> {}",
                        len_before, len_after);
                }
            } else {
                let consumed = ring.consume_batch(|_| {});
                let len_after = ring.len();
                if consumed > 0 {
                    prop_assert!(len_after < len_before,
                        "len didn't decrease after consume: {} -> {} (consumed {})",
                        len_before, len_after, consumed);
                }
            }
        }
    }
}

// =============================================================================
// Happens-before: a consumer never observes more than was produced
// =============================================================================

proptest! {
    #[test]
    fn prop_happens_before(
        writes in 0usize..50,
    ) {
        let ring = Ring::<u64>::new(Config::default());

        let mut produced = 0;
        for i in 0..writes {
            if let Some(mut r) = ring.reserve(1) {
                r.as_mut_slice()[0] = MaybeUninit::new(i as u64);
                r.commit();
                produced += 1;
            }
        }

        prop_assert_eq!(ring.len(), produced,
            "len {} != produced {}", ring.len(), produced);

        let mut consumed = 0;
        ring.consume_batch(|_| consumed += 1);

        prop_assert!(consumed <= produced,
            "consumed {} > produced {}", consumed, produced);
        prop_assert!(ring.is_empty(),
            "ring not empty after consuming all (len={})", ring.len());
    }
}

// =============================================================================
// Partial reservation: reserve(n) may return fewer than n on wrap-around
// =============================================================================

proptest! {
    #[test]
    fn prop_partial_reservation(
        request_size in 1usize..100,
        pre_fill in 0usize..50,
    ) {
        let config = Config::new(6, 1, false); // 64 capacity, 1 producer
        let ring = Ring::<u64>::new(config);
        let capacity = ring.capacity();

        let actual_fill = pre_fill.min(capacity);
        for i in 0..actual_fill {
            if let Some(mut r) = ring.reserve(1) {
                r.as_mut_slice()[0] = MaybeUninit::new(i as u64);
                r.commit();
            }
        }

        let available = capacity - ring.len();
        if let Some(r) = ring.reserve(request_size) {
            let got = r.len();
            prop_assert!(got <= request_size, "got {} > requested {}", got, request_size);
            prop_assert!(got <= available, "got {} > available {}", got, available);
            prop_assert!(got > 0, "empty reservation");
            // Don't commit - let it drop
        }
    }
}
