/*!
 * ID Generation
 * Atomic id management with type-safe wrappers and recycling support
 */

use crate::core::types::{CorrelationId, WorkerId};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic correlation id generator, shared across correlator shards
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Lock-free atomic operations
#[repr(C, align(64))]
pub struct CorrelationIdGenerator {
    counter: Arc<AtomicU64>,
}

impl CorrelationIdGenerator {
    /// Create a new generator starting at 1 (0 is reserved as "unset")
    #[inline]
    pub fn new() -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Generate the next correlation id
    #[inline]
    pub fn next(&self) -> CorrelationId {
        CorrelationId(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Current counter value (for diagnostics)
    #[inline]
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CorrelationIdGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
        }
    }
}

/// Worker id generator with recycling support
///
/// Uses a lock-free queue for recycled ids and falls back to an atomic
/// counter when none are available. Replacement workers spawned after a
/// crash reuse the retired id space instead of exhausting it.
pub struct WorkerIdGenerator {
    counter: Arc<AtomicU32>,
    free_list: Arc<crossbeam_queue::SegQueue<u32>>,
}

impl WorkerIdGenerator {
    /// Create a new generator starting at 1
    #[inline]
    pub fn new() -> Self {
        Self {
            counter: Arc::new(AtomicU32::new(1)),
            free_list: Arc::new(crossbeam_queue::SegQueue::new()),
        }
    }

    /// Allocate the next worker id, preferring recycled ids
    #[inline]
    pub fn next(&self) -> WorkerId {
        WorkerId(
            self.free_list
                .pop()
                .unwrap_or_else(|| self.counter.fetch_add(1, Ordering::SeqCst)),
        )
    }

    /// Return a retired worker id for reuse
    #[inline]
    pub fn recycle(&self, id: WorkerId) {
        self.free_list.push(id.0);
    }
}

impl Default for WorkerIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for WorkerIdGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            free_list: Arc::clone(&self.free_list),
        }
    }
}
