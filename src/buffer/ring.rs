/*!
 * Event Ring Buffer
 * Fixed-capacity lock-free ring: one atomic write cursor, many independent readers
 *
 * Writers claim slots with a fetch-and-add and publish events through
 * RCU-style pointer swaps; they never block on each other or on readers.
 * Readers detect overwrites through the per-event sequence and skip
 * forward, reporting the gap, instead of tearing.
 */

use super::cursor::ReadCursor;
use crate::core::errors::BufferError;
use crate::core::limits::BLOCK_SPIN_LIMIT;
use crate::core::types::BufferId;
use crate::event::RawEvent;
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// What a writer does when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Overwrite the oldest events; laggards observe a sequence gap (default)
    DropOldest,
    /// Fail the write with `BufferError::Full`; the caller decides
    Reject,
    /// Spin/yield until space frees up; never used on the hot path
    Block,
}

/// Events drained in one `read_batch` call, plus the gap observed on the way
#[derive(Debug)]
pub struct RingBatch {
    pub events: Vec<Arc<RawEvent>>,
    pub gap: u64,
}

/// Point-in-time ring statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingStats {
    pub written: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub occupancy: f64,
    pub capacity: usize,
}

/// Lock-free MPMC ring buffer for raw capture events
///
/// # Performance
/// - Capacity must be a power of two: slot index = `position & (capacity - 1)`
/// - Write path is one fetch-and-add plus one pointer swap, no locks
/// - Readers clone out `Arc<RawEvent>` snapshots; an overwrite under a
///   reader can never tear, the reader just holds the old Arc
pub struct EventRing {
    id: BufferId,
    slots: Box<[ArcSwapOption<RawEvent>]>,
    mask: u64,
    capacity: usize,
    /// Next position to claim; the fetch-and-add result is both the slot
    /// position and the event sequence
    write_pos: AtomicU64,
    policy: OverflowPolicy,
    /// Flipped by the backpressure controller at critical pressure
    force_drop_oldest: AtomicBool,
    destroyed: AtomicBool,
    /// Registered reader positions, weakly held so a dropped cursor cannot
    /// pin the full-buffer floor forever
    cursors: RwLock<Vec<Weak<AtomicU64>>>,
    written: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

impl EventRing {
    /// Create a ring with the given capacity and overflow policy
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two. This is the only
    /// construction-time fatal error in the pipeline; `CaptureConfig`
    /// validates capacities before any ring is built.
    pub fn new(id: BufferId, capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(
            capacity > 0 && capacity.is_power_of_two(),
            "ring capacity must be a nonzero power of two, got {capacity}"
        );

        let slots = (0..capacity)
            .map(|_| ArcSwapOption::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            id,
            slots,
            mask: (capacity - 1) as u64,
            capacity,
            write_pos: AtomicU64::new(0),
            policy,
            force_drop_oldest: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            cursors: RwLock::new(Vec::new()),
            written: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write an event, stamping its sequence with the claimed position
    ///
    /// Never panics on a full buffer: `Reject` returns a tagged error,
    /// `DropOldest` overwrites, `Block` spins until space frees up.
    pub fn write(&self, event: RawEvent) -> Result<u64, BufferError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(BufferError::Destroyed);
        }

        match self.effective_policy() {
            OverflowPolicy::DropOldest => Ok(self.publish(event)),
            OverflowPolicy::Reject => {
                let claimed = self.claimed_unread();
                if claimed >= self.capacity as u64 {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    return Err(BufferError::Full(claimed));
                }
                Ok(self.publish(event))
            }
            OverflowPolicy::Block => {
                let mut spins = 0u32;
                while self.claimed_unread() >= self.capacity as u64 {
                    if self.destroyed.load(Ordering::Acquire) {
                        return Err(BufferError::Destroyed);
                    }
                    if spins < BLOCK_SPIN_LIMIT {
                        spins += 1;
                        std::hint::spin_loop();
                    } else {
                        std::thread::yield_now();
                    }
                }
                Ok(self.publish(event))
            }
        }
    }

    #[inline]
    fn publish(&self, mut event: RawEvent) -> u64 {
        let pos = self.write_pos.fetch_add(1, Ordering::AcqRel);
        event.sequence = pos;

        let published = Arc::new(event);
        let slot = &self.slots[(pos & self.mask) as usize];

        // A racing writer one full lap ahead may have landed first; keep the
        // newer lap, the stale event is simply part of the overwrite gap.
        slot.rcu(|current| match current {
            Some(existing) if existing.sequence > pos => Some(Arc::clone(existing)),
            _ => Some(Arc::clone(&published)),
        });

        self.written.fetch_add(1, Ordering::Relaxed);
        pos
    }

    /// Create a new independent reader starting at the oldest available event
    pub fn cursor(&self) -> ReadCursor {
        let head = self.write_pos.load(Ordering::Acquire);
        let cursor = ReadCursor::new(head.saturating_sub(self.capacity as u64));
        self.cursors
            .write()
            .push(Arc::downgrade(&cursor.position_handle()));
        cursor
    }

    /// Read the next event for this cursor
    ///
    /// Returns `Ok(None)` when the cursor is caught up (or its next slot is
    /// claimed but not yet published). A cursor that fell more than
    /// `capacity` behind skips to the oldest still-present event and records
    /// the gap on both the cursor and the ring's dropped counter.
    pub fn read(&self, cursor: &ReadCursor) -> Result<Option<Arc<RawEvent>>, BufferError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(BufferError::Destroyed);
        }

        loop {
            let pos = cursor.position();
            let head = self.write_pos.load(Ordering::Acquire);
            if pos >= head {
                return Ok(None);
            }

            let slot = &self.slots[(pos & self.mask) as usize];
            let Some(event) = slot.load_full() else {
                // Claimed but not yet published
                return Ok(None);
            };

            if event.sequence == pos {
                if cursor.try_advance(pos, pos + 1) {
                    return Ok(Some(event));
                }
                // Another reader of this cursor claimed the position
                continue;
            }

            if event.sequence < pos {
                // Our lap has not been published into this slot yet
                return Ok(None);
            }

            // Lapped: the slot already holds a later lap, so everything up
            // to the oldest surviving position is gone.
            let oldest = head.saturating_sub(self.capacity as u64);
            debug_assert!(oldest > pos);
            let gap = oldest - pos;
            if cursor.try_advance(pos, oldest) {
                cursor.record_gap(gap);
                self.dropped.fetch_add(gap, Ordering::Relaxed);
            }
        }
    }

    /// Drain up to `max` events in cursor order
    pub fn read_batch(&self, cursor: &ReadCursor, max: usize) -> Result<RingBatch, BufferError> {
        let gap_before = cursor.gap_observed();
        let mut events = Vec::new();

        while events.len() < max {
            match self.read(cursor)? {
                Some(event) => events.push(event),
                None => break,
            }
        }

        Ok(RingBatch {
            events,
            gap: cursor.gap_observed() - gap_before,
        })
    }

    /// Slots claimed but not yet consumed by the slowest live reader
    pub fn claimed_unread(&self) -> u64 {
        let head = self.write_pos.load(Ordering::Acquire);
        let mut floor = None;
        let mut stale = false;

        {
            let cursors = self.cursors.read();
            for weak in cursors.iter() {
                match weak.upgrade() {
                    Some(pos) => {
                        let p = pos.load(Ordering::Acquire);
                        floor = Some(floor.map_or(p, |f: u64| f.min(p)));
                    }
                    None => stale = true,
                }
            }
        }

        if stale {
            self.cursors.write().retain(|w| w.strong_count() > 0);
        }

        head - floor.unwrap_or(0).min(head)
    }

    /// Claimed-but-unread ratio, 0.0 to 1.0
    #[inline]
    pub fn occupancy(&self) -> f64 {
        (self.claimed_unread() as f64 / self.capacity as f64).min(1.0)
    }

    /// Override the configured policy toward `DropOldest` (and back)
    ///
    /// Issued by the backpressure controller at critical pressure so that
    /// even `Reject`/`Block` writers stop accumulating claimed slots.
    #[inline]
    pub fn set_force_drop_oldest(&self, force: bool) {
        self.force_drop_oldest.store(force, Ordering::Relaxed);
    }

    #[inline]
    fn effective_policy(&self) -> OverflowPolicy {
        if self.force_drop_oldest.load(Ordering::Relaxed) {
            OverflowPolicy::DropOldest
        } else {
            self.policy
        }
    }

    /// Invalidate all cursors and release buffered events
    ///
    /// Subsequent reads and writes return `BufferError::Destroyed` rather
    /// than undefined behavior.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        for slot in self.slots.iter() {
            slot.store(None);
        }
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            written: self.written.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            occupancy: self.occupancy(),
            capacity: self.capacity,
        }
    }
}

impl std::fmt::Debug for EventRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRing")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("write_pos", &self.write_pos.load(Ordering::Relaxed))
            .field("written", &self.written.load(Ordering::Relaxed))
            .field("rejected", &self.rejected.load(Ordering::Relaxed))
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}
