//! Property tests for the ring/sequence protocol.

use std::sync::Arc;

use proptest::collection::vec;
use proptest::prelude::*;

use strata_ring::{Availability, Gate, RingBuffer, ScSubscriber, SpPublisher, cursor};

/// Push `values` through a small SPSC ring, draining whenever the
/// publisher reports FULL, and return the received order.
fn pump_spsc(capacity: usize, values: &[u16]) -> Vec<u16> {
    let avail = Arc::new(Availability::new(capacity));
    let sub = Arc::new(ScSubscriber::new(Arc::clone(&avail) as Arc<dyn Gate>));
    let publisher = SpPublisher::new(avail, Arc::clone(&sub) as Arc<dyn Gate>, capacity);
    let ring = RingBuffer::<u16>::new(capacity);

    let mut received = Vec::with_capacity(values.len());
    let mut drain = |received: &mut Vec<u16>| {
        let c = sub.next();
        if c >= 0 {
            received.push(*ring.slot(c).lock());
            sub.done(c);
            true
        } else {
            false
        }
    };

    for &value in values {
        loop {
            let c = publisher.next();
            if c == cursor::NONE {
                assert!(drain(&mut received), "a full ring must be drainable");
                continue;
            }
            *ring.slot(c).lock() = value;
            publisher.done(c);
            break;
        }
    }
    while drain(&mut received) {}
    received
}

proptest! {
    #[test]
    fn prop_spsc_is_fifo(
        capacity_log2 in 0_u32..6,
        values in vec(any::<u16>(), 0..200),
    ) {
        let capacity = 1_usize << capacity_log2;
        let received = pump_spsc(capacity, &values);
        prop_assert_eq!(received, values, "every value delivered once, in order");
    }

    #[test]
    fn prop_publisher_full_exactly_at_capacity(capacity_log2 in 0_u32..6) {
        let capacity = 1_usize << capacity_log2;
        let avail = Arc::new(Availability::new(capacity));
        let sub = Arc::new(ScSubscriber::new(Arc::clone(&avail) as Arc<dyn Gate>));
        let publisher = SpPublisher::new(avail, Arc::clone(&sub) as Arc<dyn Gate>, capacity);

        for expected in 0..capacity as i64 {
            prop_assert_eq!(publisher.next(), expected);
        }
        prop_assert_eq!(publisher.next(), cursor::NONE);
    }
}
