/*!
 * Load Shedding Gate
 * Statistical sampling applied before the buffer write under pressure
 */

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Shared shed state between the backpressure controller (writer) and the
/// ingest hot path (reader)
///
/// While inactive the gate costs one relaxed load. While active, events are
/// kept with probability `keep_pct`/100 using a thread-local xorshift, so
/// load is reduced before it ever reaches the ring.
pub struct ShedGate {
    active: AtomicBool,
    keep_pct: AtomicU8,
}

impl ShedGate {
    pub fn new(keep_pct: u8) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(false),
            keep_pct: AtomicU8::new(keep_pct.min(100)),
        })
    }

    /// Decide whether to drop this event before any other work happens
    #[inline]
    pub fn should_shed(&self) -> bool {
        if !self.active.load(Ordering::Relaxed) {
            return false;
        }
        let keep = self.keep_pct.load(Ordering::Relaxed);
        if keep >= 100 {
            return false;
        }
        fast_random() % 100 >= keep as u64
    }

    /// Turn shedding on or off (backpressure controller only)
    #[inline]
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Adjust the keep percentage (hot-updatable)
    #[inline]
    pub fn set_keep_pct(&self, pct: u8) {
        self.keep_pct.store(pct.min(100), Ordering::Relaxed);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// Fast random number generator (xorshift)
#[inline]
fn fast_random() -> u64 {
    thread_local! {
        static STATE: std::cell::Cell<u64> = std::cell::Cell::new(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or(std::time::Duration::from_nanos(1)) // Fallback for broken clocks
                .as_nanos() as u64
                | 1,
        );
    }

    STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}
