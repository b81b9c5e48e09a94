/*!
 * Pipeline Statistics
 * The aggregate observability surface exposed to operators
 */

use crate::buffer::RingStats;
use crate::correlate::CorrelationSnapshot;
use crate::ingest::IngestStats;
use crate::pressure::PressureLevel;
use serde::{Deserialize, Serialize};

/// Point-in-time pipeline statistics
///
/// These counters are the only per-event signals operators see; individual
/// failures are never surfaced, they are diagnosed through drops, orphans,
/// and the pressure level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Cumulative ingest rate since start
    pub events_per_sec: f64,
    pub ingest: IngestStats,
    pub correlation: CorrelationSnapshot,
    /// Batch receive-to-correlate latency
    pub avg_latency_us: u64,
    pub p95_latency_us: u64,
    pub p99_latency_us: u64,
    /// Per-buffer counters and occupancy
    pub buffers: Vec<RingStats>,
    pub active_workers: usize,
    pub pressure: PressureLevel,
    pub memory_rss_bytes: u64,
}

impl PipelineStats {
    /// Total events dropped anywhere in the pipeline (overwrites + rejects)
    pub fn total_dropped(&self) -> u64 {
        self.buffers.iter().map(|b| b.dropped + b.rejected).sum()
    }

    /// Worst per-buffer occupancy
    pub fn max_occupancy(&self) -> f64 {
        self.buffers.iter().map(|b| b.occupancy).fold(0.0, f64::max)
    }
}

/// Sum ingest counters across per-buffer ingestors
pub(super) fn aggregate_ingest<I: Iterator<Item = IngestStats>>(stats: I) -> IngestStats {
    stats.fold(
        IngestStats {
            ingested: 0,
            shed: 0,
            failed: 0,
            disabled: 0,
        },
        |mut acc, s| {
            acc.ingested += s.ingested;
            acc.shed += s.shed;
            acc.failed += s.failed;
            acc.disabled += s.disabled;
            acc
        },
    )
}
