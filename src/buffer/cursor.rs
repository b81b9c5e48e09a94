/*!
 * Read Cursors
 * Independent reader positions over a ring buffer
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An independent reader position over one ring buffer
///
/// Each consumer owns its own cursor; multiple consumers read the same
/// buffer at different paces without coordination. Cloning shares the
/// underlying position, which is how partition reassignment carries a
/// cursor to a new worker without resetting it.
#[derive(Debug, Clone)]
pub struct ReadCursor {
    position: Arc<AtomicU64>,
    gaps: Arc<AtomicU64>,
}

impl ReadCursor {
    pub(super) fn new(start: u64) -> Self {
        Self {
            position: Arc::new(AtomicU64::new(start)),
            gaps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Next position this cursor will read
    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Total events this cursor has observed as dropped (sequence gaps)
    #[inline]
    pub fn gap_observed(&self) -> u64 {
        self.gaps.load(Ordering::Relaxed)
    }

    /// Advance from an observed position, failing if another reader of this
    /// same cursor got there first (at most one delivery per position even
    /// during a partition handoff)
    #[inline]
    pub(super) fn try_advance(&self, from: u64, to: u64) -> bool {
        self.position
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub(super) fn record_gap(&self, gap: u64) {
        self.gaps.fetch_add(gap, Ordering::Relaxed);
    }

    pub(super) fn position_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.position)
    }
}
