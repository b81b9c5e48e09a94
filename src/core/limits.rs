/*!
 * Pipeline Limits and Constants
 *
 * Centralized location for all tunable defaults, thresholds, and magic
 * numbers. Organized by component for maintainability and discoverability.
 *
 * ## Design Philosophy
 * - All values include rationale comments explaining WHY they exist
 * - Performance-critical constants are marked with [PERF]
 */

use std::time::Duration;

// =============================================================================
// RING BUFFER
// =============================================================================

/// Default ring capacity (must be a power of two)
/// [PERF] Slot index = `position & (capacity - 1)`, no division in the hot path
pub const DEFAULT_RING_CAPACITY: usize = 65_536;

/// Default number of independent ring buffers
/// Spreads producer contention on the write cursor across buffers
pub const DEFAULT_BUFFER_COUNT: usize = 4;

/// Spin iterations before yielding under the block overflow policy
/// [PERF] Short spins win when a reader frees a slot within ~1us; beyond
/// that, yielding avoids burning a core
pub const BLOCK_SPIN_LIMIT: u32 = 64;

// =============================================================================
// INGEST
// =============================================================================

/// Maximum bytes retained per payload string before truncation
/// Bounds hot-path allocation and downstream storage width
pub const MAX_PAYLOAD_STRING_BYTES: usize = 256;

/// Default shed sampling rate: percentage of events KEPT while shedding
/// 100 = keep everything until the controller says otherwise
pub const DEFAULT_SHED_KEEP_PCT: u8 = 100;

// =============================================================================
// WORKER POOL
// =============================================================================

/// Events drained per batch read
/// Amortizes per-event channel overhead without holding batches so long
/// that correlation latency suffers
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Initial backoff after an empty drain pass
pub const DRAIN_BACKOFF_MIN: Duration = Duration::from_micros(50);

/// Backoff ceiling for an idle buffer
/// Also the worst-case flush latency for a trickle of events
pub const DRAIN_BACKOFF_MAX: Duration = Duration::from_millis(10);

/// Default worker count bounds
pub const DEFAULT_WORKERS_MIN: usize = 1;
pub const DEFAULT_WORKERS_TARGET: usize = 2;
pub const DEFAULT_WORKERS_MAX: usize = 8;

/// Largest single scale-up step the controller may recommend
/// Prevents thundering-herd worker creation at critical pressure
pub const DEFAULT_MAX_SCALE_STEP: usize = 4;

// =============================================================================
// CORRELATION
// =============================================================================

/// Default correlator shard count (power of two)
/// One shard keeps all state local; raise for very wide producer sets
pub const DEFAULT_CORRELATOR_SHARDS: usize = 1;

/// Bounded depth of each worker -> correlator channel
/// A slow correlator backpressures workers here, never producers
pub const CORRELATOR_CHANNEL_DEPTH: usize = 64;

/// Time-to-live for pending correlation state (open calls, unmatched sends)
/// Entries older than this are evicted by the periodic sweep, bounding memory
pub const DEFAULT_CORRELATION_TTL: Duration = Duration::from_secs(30);

/// Interval between correlation state sweeps
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// Confidence assigned when a message match had multiple live candidates
/// and the FIFO tie-break picked the earliest unconsumed send
pub const HEURISTIC_MATCH_CONFIDENCE: f32 = 0.75;

// =============================================================================
// BACKPRESSURE
// =============================================================================

/// Occupancy ratios per pressure level
pub const OCCUPANCY_ELEVATED: f64 = 0.50;
pub const OCCUPANCY_HIGH: f64 = 0.80;
pub const OCCUPANCY_CRITICAL: f64 = 0.95;

/// Rolling batch latency thresholds (receive-to-correlate)
pub const LATENCY_ELEVATED: Duration = Duration::from_millis(20);
pub const LATENCY_HIGH: Duration = Duration::from_millis(50);

/// Process memory ratio that forces critical pressure
pub const MEMORY_CRITICAL: f64 = 0.90;

/// Default memory budget for the host process (1GB)
/// The memory ratio fed to the pressure sampler is RSS / this budget
pub const DEFAULT_MEMORY_LIMIT: u64 = 1024 * 1024 * 1024;

/// Controller sampling interval
/// Fast enough to catch a filling buffer before it wraps at typical rates
pub const PRESSURE_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// EWMA weight denominator for the rolling latency average
/// [PERF] Power of two so the update is shift-and-add on the hot path
pub const LATENCY_EWMA_WEIGHT: u64 = 8;
