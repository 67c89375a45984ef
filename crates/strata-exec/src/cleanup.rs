//! Terminal reclamation of reduce-task slots.
//!
//! The cleanup subscriber is the tail stage of a shard's reduce ring: it
//! runs strictly behind the collect fan-out, so every task it sees has
//! been released by every attached collector and its reducer has long
//! finished. Reclamation happens in place (the row list is cleared, not
//! freed, and the owning-query reference dropped) and only then does the
//! slot return to the publisher's availability window.

use strata_ring::cursor;

use crate::bus::MessageBus;

/// Reclaim one released task on `shard_index`, for any query.
///
/// Returns whether a task was reclaimed. The last reclaimed task of a
/// sequence triggers its terminal release (collect-subscriber detach,
/// done-latch). Replays cannot occur, since each cursor passes this stage
/// exactly once per publication, and the terminal transition fires on
/// exact counter equality, so a spurious extra call is inert.
pub(crate) fn consume_cleanup_once(bus: &MessageBus, shard_index: usize) -> bool {
    let shard = bus.shard(shard_index);
    loop {
        let c = shard.cleanup_sub.next();
        if c == cursor::RETRY {
            std::hint::spin_loop();
            continue;
        }
        if c == cursor::NONE {
            return false;
        }
        let owner = {
            let mut slot = shard.reduce_ring.slot(c).lock();
            let owner = slot.frame_sequence.take();
            slot.rows.clear();
            slot.collected = false;
            owner
        };
        shard.cleanup_sub.done(c);
        if let Some(fs) = owner {
            tracing::debug!(
                shard = shard_index,
                id = fs.id(),
                cursor = c,
                "cleanup.reclaim"
            );
            fs.note_frame_reclaimed();
        }
        return true;
    }
}
